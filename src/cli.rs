//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::rag::DocumentType;

/// Talk to the PhoenixCare RAG service through the resilience layer
#[derive(Parser, Debug)]
#[command(name = "phoenixcare-resilience")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PHOENIXCARE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "PHOENIXCARE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PHOENIXCARE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Print circuit breaker stats as JSON before exiting
    #[arg(long, global = true)]
    pub stats: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask the assistant a question
    Chat {
        /// Message to send
        #[arg(required = true)]
        message: String,

        /// User id sent along with the message
        #[arg(short, long, default_value = "cli")]
        user_id: String,

        /// Repeat the request this many times (observe the breaker under load)
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Analyze a document file
    Analyze {
        /// Text file to analyze
        #[arg(required = true)]
        file: PathBuf,

        /// User id sent along with the document
        #[arg(short, long, default_value = "cli")]
        user_id: String,

        /// Document type (medical, administrative, mdph, other)
        #[arg(short = 't', long, default_value = "other")]
        doc_type: DocumentType,
    },

    /// Print the effective configuration as YAML
    Config,
}
