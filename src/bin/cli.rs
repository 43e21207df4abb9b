//! `palace` — command-line interface to the memory palace.

use clap::{Parser, Subcommand};

use memory_palace::error::Result;
use memory_palace::types::{RecallInput, RememberInput};
use memory_palace::{tools, Palace};

#[derive(Parser)]
#[command(name = "palace")]
#[command(about = "Persistent semantic memory for conversational AI agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Remember {
        instance_id: String,
        #[arg(short = 't', long = "type")]
        memory_type: String,
        content: String,
        #[arg(short, long)]
        subject: Option<String>,
        /// Comma-separated keywords
        #[arg(short, long)]
        keywords: Option<String>,
        #[arg(short = 'i', long, default_value = "5")]
        importance: i32,
        #[arg(short, long, default_value = "life")]
        project: String,
        #[arg(long)]
        supersedes: Option<i64>,
    },
    /// Search memories
    Recall {
        query: String,
        #[arg(short, long)]
        instance_id: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: i64,
        #[arg(long)]
        no_synthesize: bool,
    },
    /// Archive a memory
    Forget {
        id: i64,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Get a memory by id
    Get { id: i64 },
    /// Show aggregate memory statistics
    Stats,
    /// Generate embeddings for every memory lacking one
    Backfill,
    /// Create a graph edge between two memories
    Link {
        source_id: i64,
        target_id: i64,
        #[arg(short, long, default_value = "relates_to")]
        relation_type: String,
        #[arg(short, long, default_value = "1.0")]
        strength: f32,
        #[arg(short, long)]
        bidirectional: bool,
    },
    /// Mark one memory as superseding another
    Supersede {
        new_id: i64,
        old_id: i64,
        #[arg(long, default_value = "true")]
        archive_old: bool,
    },
    /// Extract memories from a transcript file
    Reflect {
        transcript_path: String,
        instance_id: String,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a note to another instance
    HandoffSend {
        from: String,
        to: String,
        #[arg(short = 't', long = "type", default_value = "fyi")]
        message_type: String,
        content: String,
        #[arg(short, long)]
        subject: Option<String>,
    },
    /// List handoff messages addressed to an instance
    HandoffList {
        for_instance: String,
        #[arg(long)]
        all: bool,
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Mark a handoff message as read
    HandoffRead { message_id: i64, read_by: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let palace = Palace::connect().await?;

    match cli.command {
        Commands::Remember {
            instance_id,
            memory_type,
            content,
            subject,
            keywords,
            importance,
            project,
            supersedes,
        } => {
            let input = RememberInput {
                instance_id,
                memory_type,
                content,
                subject,
                keywords: keywords
                    .map(|k| k.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
                tags: vec![],
                importance: Some(importance),
                project: Some(project),
                source_type: None,
                source_context: None,
                source_session_id: None,
                supersedes_id: supersedes,
                auto_link: None,
            };
            print_result(tools::memory_remember(&palace, input).await)?;
        }

        Commands::Recall {
            query,
            instance_id,
            limit,
            no_synthesize,
        } => {
            let input = RecallInput {
                query,
                instance_id,
                limit,
                synthesize: !no_synthesize,
                ..Default::default()
            };
            print_result(tools::memory_recall(&palace, input).await)?;
        }

        Commands::Forget { id, reason } => {
            print_result(tools::memory_forget(&palace, id, reason.as_deref()).await)?;
        }

        Commands::Get { id } => {
            print_result(tools::memory_get(&palace, id).await)?;
        }

        Commands::Stats => {
            print_result(tools::memory_stats(&palace).await)?;
        }

        Commands::Backfill => {
            print_result(tools::memory_backfill_embeddings(&palace).await)?;
        }

        Commands::Link {
            source_id,
            target_id,
            relation_type,
            strength,
            bidirectional,
        } => {
            print_result(
                tools::memory_link(
                    &palace,
                    source_id,
                    target_id,
                    &relation_type,
                    strength,
                    bidirectional,
                    None,
                    None,
                )
                .await,
            )?;
        }

        Commands::Supersede {
            new_id,
            old_id,
            archive_old,
        } => {
            print_result(tools::memory_supersede(&palace, new_id, old_id, archive_old, None).await)?;
        }

        Commands::Reflect {
            transcript_path,
            instance_id,
            session_id,
            dry_run,
        } => {
            print_result(
                tools::memory_reflect(
                    &palace,
                    &transcript_path,
                    &instance_id,
                    session_id.as_deref(),
                    dry_run,
                )
                .await,
            )?;
        }

        Commands::HandoffSend {
            from,
            to,
            message_type,
            content,
            subject,
        } => {
            print_result(
                tools::memory_send_handoff(&palace, &from, &to, &message_type, &content, subject.as_deref())
                    .await,
            )?;
        }

        Commands::HandoffList {
            for_instance,
            all,
            limit,
        } => {
            print_result(
                tools::memory_get_handoffs(&palace, &for_instance, !all, None, limit).await,
            )?;
        }

        Commands::HandoffRead { message_id, read_by } => {
            print_result(tools::memory_mark_handoff_read(&palace, message_id, &read_by).await)?;
        }
    }

    Ok(())
}

fn print_result(result: tools::ToolResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
