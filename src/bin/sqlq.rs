//! sqlq CLI — operator interface to table-backed queues.

use clap::{Parser, Subcommand};
use sqlq::config::Config;
use sqlq::config::secrets::ExposeSecret;
use sqlq::config::uri::QueueUri;
use sqlq::telemetry::{TelemetryConfig, init_telemetry};
use sqlq::{ClaimToken, Db, QueueOptions, SqlQueue};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sqlq", about = "Durable relational message queues")]
struct Cli {
    /// Queue address, e.g. sql://default/orders
    queue: QueueUri,
    /// Print the queue notifications raised by the command as JSON lines
    #[arg(long, global = true)]
    events: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the queue table if it does not exist
    Create,
    /// Drop the queue table
    Drop,
    /// Remove every message
    Purge,
    /// Show the number of messages (claimed or not)
    Count,
    /// Append a message
    Enqueue {
        /// Message body (stored as UTF-8 bytes)
        body: String,
        /// Correlation id; a random one is generated when omitted
        #[arg(long)]
        message_id: Option<Uuid>,
    },
    /// Claim the oldest unclaimed message and print it
    Claim,
    /// Acknowledge (delete) a claimed message
    Ack {
        /// Claim token printed by `claim`
        token: i64,
    },
    /// Release a claimed message back to the tail of the queue
    Release {
        /// Claim token printed by `claim`
        token: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "sqlq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let url = config.connection_url(cli.queue.connection())?;
    let db = Db::connect(url.expose_secret()).await?;
    db.health_check().await?;

    let options = QueueOptions::default()
        .schema(&config.schema)
        .fingerprint(config.fingerprint());
    let queue = SqlQueue::from_uri(&cli.queue, db.clone(), options)?;

    let mut events = queue.subscribe();
    let result = run(&queue, cli.command).await;
    if cli.events {
        while let Ok(event) = events.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    db.close().await;
    result
}

async fn run(queue: &SqlQueue, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Create => {
            queue.create().await?;
            println!("Created: {}", queue.name());
        }
        Command::Drop => {
            queue.drop().await?;
            println!("Dropped: {}", queue.name());
        }
        Command::Purge => {
            queue.purge().await?;
            println!("Purged: {}", queue.name());
        }
        Command::Count => {
            if !queue.exists().await? {
                anyhow::bail!("queue '{}' does not exist", queue.name());
            }
            println!("{}", queue.count().await?);
        }
        Command::Enqueue { body, message_id } => {
            let message_id = message_id.unwrap_or_else(Uuid::new_v4);
            match queue.enqueue(message_id, body.as_bytes()).await? {
                Some(sequence_id) => println!("Enqueued: {message_id} (sequence {sequence_id})"),
                None => anyhow::bail!("enqueue cancelled"),
            }
        }
        Command::Claim => match queue.claim().await? {
            Some(message) => {
                println!("Token:      {}", message.token);
                println!("Message ID: {}", message.message_id);
                println!("Body:       {}", String::from_utf8_lossy(&message.body));
            }
            None => println!("No message available."),
        },
        Command::Ack { token } => {
            queue.acknowledge(ClaimToken(token)).await?;
            println!("Acknowledged: {token}");
        }
        Command::Release { token } => {
            queue.release(ClaimToken(token)).await?;
            println!("Released: {token}");
        }
    }
    Ok(())
}
