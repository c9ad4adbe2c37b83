//! Thread-safe parser pool for tree-sitter parsers
//!
//! Tree-sitter parsers are not Sync, so parsing goes through dedicated
//! worker threads fed over a channel. Workers reuse their parser across
//! requests and re-target it per job's grammar. The pool is cheap to clone
//! and exposes both a blocking and an async entry point.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use tree_sitter::{Parser, Tree};
use trellis_core::error::{Error, Result};

use crate::language::SourceLanguage;

/// One parsing request.
#[derive(Debug)]
pub struct ParseJob {
    pub language: SourceLanguage,
    pub source: String,
    /// Used only for error reporting.
    pub path: String,
}

struct WorkerRequest {
    job: ParseJob,
    reply: mpsc::Sender<Result<Tree>>,
}

/// Pool of parser worker threads.
pub struct ParserPool {
    sender: mpsc::Sender<WorkerRequest>,
}

impl ParserPool {
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkerRequest>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..num_workers.max(1) {
            let receiver = Arc::clone(&receiver);
            std::thread::spawn(move || Self::worker_thread(worker_id, receiver));
        }

        Self { sender }
    }

    fn worker_thread(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerRequest>>>) {
        tracing::debug!("parser worker {worker_id} started");
        let mut parser = Parser::new();

        loop {
            let request = match receiver.lock().expect("parser pool lock").recv() {
                Ok(request) => request,
                Err(_) => {
                    tracing::debug!("parser worker {worker_id} shutting down");
                    break;
                }
            };

            let WorkerRequest { job, reply } = request;
            let result = Self::run_job(&mut parser, job);
            if reply.send(result).is_err() {
                tracing::warn!("parse result receiver dropped before delivery");
            }
        }
    }

    fn run_job(parser: &mut Parser, job: ParseJob) -> Result<Tree> {
        let Some(grammar) = job.language.grammar() else {
            return Err(Error::Parse {
                file: job.path,
                message: "no grammar for this extension".to_string(),
            });
        };
        parser.set_language(&grammar).map_err(|e| Error::Parse {
            file: job.path.clone(),
            message: format!("failed to set grammar: {e}"),
        })?;
        parser.parse(&job.source, None).ok_or_else(|| Error::Parse {
            file: job.path,
            message: "parser produced no tree".to_string(),
        })
    }

    /// Parse on a pool worker, blocking the calling thread for the result.
    pub fn parse_blocking(&self, job: ParseJob) -> Result<Tree> {
        let (reply, response) = mpsc::channel();
        self.sender
            .send(WorkerRequest { job, reply })
            .map_err(|_| Error::Parse {
                file: String::new(),
                message: "parser pool is shut down".to_string(),
            })?;
        response.recv().map_err(|_| Error::Parse {
            file: String::new(),
            message: "parser worker died".to_string(),
        })?
    }

    /// Async wrapper over [`Self::parse_blocking`] for callers on a runtime.
    pub async fn parse(&self, job: ParseJob) -> Result<Tree> {
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || {
            let (reply, response) = mpsc::channel();
            sender
                .send(WorkerRequest { job, reply })
                .map_err(|_| Error::Parse {
                    file: String::new(),
                    message: "parser pool is shut down".to_string(),
                })?;
            response.recv().map_err(|_| Error::Parse {
                file: String::new(),
                message: "parser worker died".to_string(),
            })?
        })
        .await
        .map_err(|e| Error::Parse {
            file: String::new(),
            message: format!("parse task join error: {e}"),
        })?
    }
}

impl Clone for ParserPool {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Pool sized to the machine, with at least two workers.
pub fn create_parser_pool() -> ParserPool {
    let num_workers = std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2);
    ParserPool::new(num_workers)
}
