//! docsearch - command-line front end for the hybrid retrieval engine.
//!
//! ```bash
//! docsearch index                       # load every *.chunks.json under paths.chunks_dir
//! docsearch query "minimum wage" --json
//! docsearch reindex data/labor-code.chunks.json
//! docsearch eval testset.json -k 20
//! docsearch status --warm
//! ```
//!
//! Settings come from `config.toml`, the `RUST_ENV` overlay and `APP_*`
//! environment variables.

mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docsearch_core::chunk_files;
use docsearch_core::config::Config;
use docsearch_core::query::QueryRequest;
use docsearch_hybrid::eval::load_testset;
use docsearch_hybrid::{evaluate, QueryContext};

#[derive(Parser)]
#[command(name = "docsearch", version, about = "Hybrid lexical + dense document retrieval")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load chunk files and (re)build the vector table and lexical index
    Index {
        /// Directory of chunk files (default: paths.chunks_dir)
        chunks_dir: Option<PathBuf>,
    },
    /// Answer one question
    Query {
        question: String,
        #[arg(long)]
        top_k_dense: Option<usize>,
        #[arg(long)]
        top_k_lexical: Option<usize>,
        #[arg(long)]
        rerank_top_k: Option<usize>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace one document from its chunk file
    Reindex { file: PathBuf },
    /// Rebuild only the lexical index from the stored children
    RebuildLexical,
    /// Measure recall@k and latency over a test set
    Eval {
        testset: PathBuf,
        #[arg(short, long, default_value = "20")]
        k: usize,
        /// Also write the report to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show index and model readiness
    Status {
        /// Load both models before reporting
        #[arg(long)]
        warm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let settings = Config::load()?.settings()?;
    let ctx = QueryContext::open(settings).await?;

    match cli.command {
        Command::Index { chunks_dir } => {
            let dir = chunks_dir.unwrap_or_else(|| ctx.settings().paths.chunks_dir());
            let docs = chunk_files::load_dir(&dir)?;
            info!(dir = %dir.display(), documents = docs.len(), "loaded chunk files");
            let pb = ProgressBar::new(docs.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
                    .progress_chars("#>-"),
            );
            let status = ctx
                .index_documents(docs, |doc_id, _| {
                    pb.set_message(doc_id.to_string());
                    pb.inc(1);
                })
                .await?;
            pb.finish_and_clear();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Query { question, top_k_dense, top_k_lexical, rerank_top_k, json } => {
            let defaults = &ctx.settings().retrieval;
            let req = QueryRequest {
                question,
                top_k_dense: top_k_dense.unwrap_or(defaults.top_k_dense),
                top_k_lexical: top_k_lexical.unwrap_or(defaults.top_k_lexical),
                rerank_top_k: rerank_top_k.unwrap_or(defaults.rerank_top_k),
            };
            let token = CancellationToken::new();
            let on_interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            let resp = ctx.query_with_cancel(&req, &token).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp)?);
            } else {
                println!("{}", output::format_response(&req.question, &resp));
            }
        }
        Command::Reindex { file } => {
            let doc = chunk_files::load_file(&file)?;
            let status = ctx.reindex_document(&doc.doc_id, doc.chunks).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::RebuildLexical => {
            let status = ctx.rebuild_lexical().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Eval { testset, k, out } => {
            let cases = load_testset(&testset)?;
            ctx.warm_up().await?;
            let report = evaluate(&ctx, &cases, k).await;
            println!("{}", output::format_report(&report));
            if let Some(out) = out {
                std::fs::write(&out, serde_json::to_vec_pretty(&report)?)?;
                info!(path = %out.display(), "eval report written");
            }
        }
        Command::Status { warm } => {
            if warm {
                ctx.warm_up().await?;
            }
            println!("{}", serde_json::to_string_pretty(&ctx.readiness())?);
        }
    }

    Ok(())
}
