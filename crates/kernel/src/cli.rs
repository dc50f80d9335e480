//! Admin command line over the kernel services.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::index::{Document, DocumentEvent};
use crate::models::{Blueprint, BlueprintId};
use crate::query::{DocumentQuery, FilterOp, FilterValue, SortDirection};
use crate::state::Kernel;

/// Blueprint schema administration.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the kernel tables.
    Migrate,

    /// List every blueprint.
    List,

    /// Print a blueprint's path tree.
    Tree { code: String },

    /// Show what a blueprint embeds and what embeds it.
    Graph { code: String },

    /// List components that can be embedded without creating a cycle.
    Embeddable { code: String },

    /// Check whether a blueprint can be deleted.
    CanDelete { code: String },

    /// Index a JSON payload file as a document of a full blueprint.
    Index {
        code: String,
        document_id: Uuid,
        payload: PathBuf,
    },

    /// Find documents by one indexed path.
    Query {
        code: String,
        path: String,
        value: String,

        /// Filter operator (=, !=, >, >=, <, <=, in, contains, starts_with).
        #[arg(long, default_value = "=")]
        op: String,

        /// Sort results by this path.
        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        desc: bool,

        #[arg(long)]
        limit: Option<u64>,
    },
}

async fn blueprint(kernel: &Kernel, code: &str) -> Result<Blueprint> {
    kernel
        .blueprints()
        .get_by_code(code)
        .await
        .with_context(|| format!("unknown blueprint '{code}'"))
}

async fn codes(kernel: &Kernel, ids: &[BlueprintId]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(kernel.blueprints().get(*id).await?.code);
    }
    Ok(out)
}

/// Parse a command-line value as JSON, falling back to a plain string.
fn filter_value(raw: &str) -> FilterValue {
    serde_json::from_str(raw).unwrap_or_else(|_| FilterValue::String(raw.to_string()))
}

/// Execute one command.
pub async fn run(command: Command, kernel: &Kernel) -> Result<()> {
    match command {
        Command::Migrate => {
            println!("schema is up to date");
        }
        Command::List => {
            for bp in kernel.blueprints().list().await? {
                println!(
                    "{:<24} {:<10} {}",
                    bp.code,
                    bp.kind.as_str(),
                    bp.content_type.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Tree { code } => {
            let bp = blueprint(kernel, &code).await?;
            let tree = kernel.paths().tree(bp.id).await?;
            for visit in tree.descendants(None, kernel.max_depth())? {
                let path = visit.path;
                let mut flags = Vec::new();
                if path.is_indexed {
                    flags.push("indexed");
                }
                if path.is_required {
                    flags.push("required");
                }
                if path.is_materialized() {
                    flags.push("materialized");
                }
                println!(
                    "{:indent$}{} ({}, {}) {}",
                    "",
                    path.name,
                    path.data_type,
                    path.cardinality,
                    flags.join(" "),
                    indent = (visit.depth - 1) * 2
                );
            }
        }
        Command::Graph { code } => {
            let bp = blueprint(kernel, &code).await?;
            let graph = kernel.blueprints().dependency_graph(bp.id).await?;
            let report = serde_json::json!({
                "depends_on": codes(kernel, &graph.depends_on).await?,
                "depended_by": codes(kernel, &graph.depended_by).await?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Embeddable { code } => {
            let bp = blueprint(kernel, &code).await?;
            for candidate in kernel.blueprints().embeddable_blueprints_for(bp.id).await? {
                println!("{}", candidate.code);
            }
        }
        Command::CanDelete { code } => {
            let bp = blueprint(kernel, &code).await?;
            let check = kernel.blueprints().can_delete(bp.id).await?;
            println!("{}", serde_json::to_string_pretty(&check)?);
        }
        Command::Index {
            code,
            document_id,
            payload,
        } => {
            let bp = blueprint(kernel, &code).await?;
            let raw = std::fs::read_to_string(&payload)
                .with_context(|| format!("failed to read {}", payload.display()))?;
            let data = serde_json::from_str(&raw).context("payload is not valid JSON")?;

            let report = kernel
                .indexer()
                .reindex(DocumentEvent::Updated(Document {
                    id: document_id,
                    blueprint_id: bp.id,
                    data,
                }))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Query {
            code,
            path,
            value,
            op,
            sort,
            desc,
            limit,
        } => {
            let bp = blueprint(kernel, &code).await?;
            let op: FilterOp = op.parse()?;

            let mut query = DocumentQuery::new(bp.id).where_path(&path, op, filter_value(&value));
            if let Some(sort) = sort {
                let direction = if desc {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                query = query.order_by_path(&sort, direction);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }

            for id in kernel.queries().fetch(&query).await? {
                println!("{id}");
            }
        }
    }

    Ok(())
}
