//! PhoenixCare resilience CLI
//!
//! Sends chat messages and documents to the RAG service through the
//! circuit breaker and retry layer.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use phoenixcare_resilience::{
    cli::{Cli, Command},
    config::Config,
    failsafe::CircuitBreakerRegistry,
    rag::{ChatRequest, DocumentAnalysisRequest, DocumentType, RagClient},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let registry = CircuitBreakerRegistry::new(config.failsafe.circuit_breaker.clone());

    let code = match cli.command {
        Command::Config => print_config(&config),
        Command::Chat {
            message,
            user_id,
            repeat,
        } => run_chat(&config, &registry, message, user_id, repeat).await,
        Command::Analyze {
            file,
            user_id,
            doc_type,
        } => run_analyze(&config, &registry, &file, user_id, doc_type).await,
    };

    if cli.stats {
        match serde_json::to_string_pretty(&registry.stats()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize stats: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    code
}

fn print_config(config: &Config) -> ExitCode {
    match serde_yaml::to_string(config) {
        Ok(yaml) => {
            print!("{yaml}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize configuration: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_chat(
    config: &Config,
    registry: &CircuitBreakerRegistry,
    message: String,
    user_id: String,
    repeat: u32,
) -> ExitCode {
    let client = match RagClient::new(config, registry) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build RAG client: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(endpoint = client.endpoint(), "Sending chat message");

    let request = ChatRequest {
        message,
        user_id,
        ..Default::default()
    };

    let mut degraded = false;
    for _ in 0..repeat.max(1) {
        let reply = client.generate_response(&request).await;
        degraded |= reply.is_fallback();
        match serde_json::to_string_pretty(&reply) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize reply: {e}");
                return ExitCode::FAILURE;
            }
        }
        info!(status = %client.failsafe().circuit_breaker.status_message());
    }

    if degraded {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_analyze(
    config: &Config,
    registry: &CircuitBreakerRegistry,
    file: &std::path::Path,
    user_id: String,
    document_type: DocumentType,
) -> ExitCode {
    let document = match tokio::fs::read_to_string(file).await {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Failed to read {}: {e}", file.display());
            return ExitCode::FAILURE;
        }
    };

    let client = match RagClient::new(config, registry) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build RAG client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let analysis = client
        .analyze_document(&DocumentAnalysisRequest {
            document,
            user_id,
            document_type,
        })
        .await;

    match serde_json::to_string_pretty(&analysis) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize analysis: {e}");
            return ExitCode::FAILURE;
        }
    }

    if analysis.degraded {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
