//! visuai
//!
//! Classify local images with a pretrained model and print the predictions.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use visu_ai_lib::commands::{classifier, describe};
use visu_ai_lib::config::{AppConfig, DEFAULT_TOP_K};
use visu_ai_lib::services::classifier::model_manager::ModelType;
use visu_ai_lib::{AppState, BatchView};

#[derive(Parser, Debug)]
#[command(name = "visuai")]
#[command(about = "Classify images with a pretrained model", long_about = None)]
struct Cli {
    /// Directory holding downloaded models
    #[arg(long, env = "VISUAI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Pretrained model to use
    #[arg(short, long, env = "VISUAI_MODEL", value_enum, default_value = "mobilenet-v2")]
    model: ModelType,

    /// Run inference on the CPU only
    #[arg(long, env = "VISUAI_CPU")]
    cpu: bool,

    /// Predictions kept per image
    #[arg(short = 'k', long, env = "VISUAI_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Drop predictions below this probability
    #[arg(long, default_value_t = 0.0)]
    min_probability: f32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether the model is downloaded and loaded
    Status,
    /// Download the model files without loading them
    Download,
    /// Classify image files or directories of images
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Add a sentence describing the predictions
        #[arg(long)]
        describe: bool,

        /// Ask a question about the predictions
        #[arg(long)]
        ask: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig {
        model_type: cli.model,
        use_gpu: !cli.cpu,
        top_k: cli.top_k,
        min_probability: cli.min_probability,
        ..AppConfig::default()
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let (state, provider) = AppState::from_config(&config)?;
    info!(model_dir = %config.model_dir().display(), model = ?config.model_type, "configuration loaded");

    match cli.command {
        Command::Status => {
            let status = classifier::get_model_status(&state);
            println!("downloaded: {}", provider.is_downloaded());
            println!("state:      {:?}", status.state);
        }
        Command::Download => {
            classifier::download_model(&provider).await?;
            println!("model stored in {}", provider.model_dir.display());
        }
        Command::Classify {
            paths,
            recursive,
            describe: with_description,
            ask,
            json,
        } => {
            classifier::load_model(&state).await?;
            let view = classifier::classify_paths(&state, &paths, recursive).await?;

            let predictions = view.predictions.clone().unwrap_or_default();
            let summary: Vec<_> = predictions.iter().take(10).cloned().collect();
            let description = if with_description && !summary.is_empty() {
                Some(describe::describe_predictions(&state, &summary)?)
            } else {
                None
            };
            let answer = match ask {
                Some(question) if !summary.is_empty() => {
                    Some(describe::ask_question(&state, &summary, &question).await?)
                }
                _ => None,
            };

            if json {
                let out = serde_json::json!({
                    "file_names": view.file_names,
                    "predictions": view.predictions,
                    "last_error": view.last_error,
                    "description": description,
                    "answer": answer,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_view(&view);
                if let Some(d) = description {
                    println!("\n{} ({:.0}%)", d.text, d.confidence * 100.0);
                }
                if let Some(a) = answer {
                    println!("\nQ: {}\nA: {} ({:.0}%)", a.question, a.text, a.confidence * 100.0);
                }
            }
        }
    }

    Ok(())
}

fn print_view(view: &BatchView) {
    println!("files: {}", view.file_names.join(", "));
    match &view.predictions {
        Some(predictions) if !predictions.is_empty() => {
            for p in predictions {
                println!("  {:<40} {:>6.1}%", p.class_name, p.probability * 100.0);
            }
        }
        Some(_) => println!("  no predictions"),
        None => println!("  batch did not complete"),
    }
    if let Some(err) = &view.last_error {
        println!("error ({:?}): {}", err.kind, err.message);
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("visuai=debug,visu_ai_lib=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("visuai=info,visu_ai_lib=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
