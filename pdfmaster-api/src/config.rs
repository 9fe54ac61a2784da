//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use pdfmaster::assemble::MAX_MERGE_INPUTS;

/// Default upload limit: 100 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Default tracing filter when neither `RUST_LOG` nor `--log-filter` is set
pub const DEFAULT_LOG_FILTER: &str = "pdfmaster_api=info,pdfmaster=info,tower_http=debug";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "pdfmaster-api",
    about = "Document and image transformation API",
    version
)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "PDFMASTER_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Parent directory for staged artifacts (defaults to the system temp dir)
    #[arg(long, env = "PDFMASTER_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Largest accepted request body in bytes
    #[arg(long, env = "PDFMASTER_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Most files accepted by the merge endpoint
    #[arg(long, env = "PDFMASTER_MAX_MERGE_FILES", default_value_t = MAX_MERGE_INPUTS)]
    pub max_merge_files: usize,

    /// Tracing filter directives, used when RUST_LOG is unset
    #[arg(long, env = "PDFMASTER_LOG")]
    pub log_filter: Option<String>,
}

/// Request limits enforced by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_upload_bytes: usize,
    pub max_merge_files: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_merge_files: MAX_MERGE_INPUTS,
        }
    }
}

impl ServerConfig {
    /// Limits with the merge count capped at what the assembler accepts.
    pub fn limits(&self) -> Limits {
        Limits {
            max_upload_bytes: self.max_upload_bytes,
            max_merge_files: self.max_merge_files.clamp(2, MAX_MERGE_INPUTS),
        }
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
