use clap::{Parser, Subcommand};
use hybrix::prelude::*;
use hybrix::RestApi;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Hybrid multi-space semantic search
#[derive(Parser, Debug)]
#[command(name = "hybrix")]
#[command(about = "Weighted text and numeric similarity search", long_about = None)]
struct Args {
    /// Path to a JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the configured indices over HTTP
    Serve {
        /// HTTP API port
        #[arg(long, default_value_t = 8080)]
        http_port: u16,
    },
    /// Index a small sample dataset and query it
    Demo {
        /// Text to search the review sample for
        #[arg(long, default_value = "excellent performance")]
        search: String,

        /// Free-text query for the product sample (needs a language model key)
        #[arg(long)]
        natural: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting hybrix v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => {
            info!("Configuration: {:?}", path);
            EngineConfig::from_file(path)?
        }
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Serve { http_port } => serve(&config, http_port).await,
        Command::Demo { search, natural } => demo(&config, &search, natural.as_deref()).await,
    }
}

async fn serve(config: &EngineConfig, http_port: u16) -> anyhow::Result<()> {
    let executor = Arc::new(config.build_executor()?);
    info!("Indices: {:?}", executor.list_indices());

    let executor_http = executor.clone();
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(executor_http, http_port).await {
                error!("HTTP server error: {}", e);
            }
        })
    });

    info!("HTTP API: http://localhost:{}/indices", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    for name in executor.list_indices() {
        executor.drop_index(&name);
    }
    Ok(())
}

async fn demo(config: &EngineConfig, search: &str, natural: Option<&str>) -> anyhow::Result<()> {
    let executor = config.build_executor()?;
    let provider = config.embedding_provider()?;

    // Reviews: a single text space
    let reviews = Index::new(
        config.index_config("reviews"),
        Schema::new("review").text("body"),
        vec![Space::text("body", "body", provider.clone())],
    )?;
    executor.register(reviews)?;
    executor
        .put(
            "reviews",
            vec![
                Record::new(0u64).with_field("body", "Amazing acting and great story"),
                Record::new(1u64).with_field("body", "Boring plot with bad acting"),
            ],
        )
        .await?;

    let result = executor
        .query("reviews", QueryInputs::new().weight("body", 1.0).similar("body", search))
        .await?;
    println!("reviews similar to {:?}:", search);
    print_result(&result);

    // Products: description meaning plus a rating that prefers higher values
    let products = Index::new(
        config.index_config("products"),
        Schema::new("product").text("description").number("rating"),
        vec![
            Space::text("description", "description", provider),
            Space::number("rating", "rating", 1.0, 5.0, NumberMode::Maximum)?,
        ],
    )?;
    executor.register(products)?;
    executor
        .put(
            "products",
            vec![
                Record::new(1u64)
                    .with_field("description", "Budget toothbrush in black color. Just what you need.")
                    .with_field("rating", 1.0),
                Record::new(2u64)
                    .with_field("description", "High-end toothbrush created with no compromises.")
                    .with_field("rating", 5.0),
                Record::new(3u64)
                    .with_field("description", "A toothbrush created for the smart 21st century man.")
                    .with_field("rating", 3.0),
            ],
        )
        .await?;

    let template = QueryTemplate::new()
        .weight("description", Param::named("description_weight", "").or(1.0))
        .similar(
            "description",
            Param::named(
                "description_query",
                "The text in the user's query that refers to product descriptions.",
            )
            .or(FieldValue::from("toothbrush")),
        )
        .weight("rating", Param::named("rating_weight", "").or(1.0))
        .limit(Param::named("limit", "").or(3));

    let mut params = BTreeMap::new();
    params.insert("rating_weight".to_string(), ParamValue::Number(1.0));
    let result = executor.query_template("products", &template, &params).await?;
    println!("products by description and rating:");
    print_result(&result);

    if let Some(text) = natural {
        if executor.translator().is_none() {
            warn!("Skipping natural query: no language model configured");
            return Ok(());
        }
        match executor.query_natural("products", &template, text, &BTreeMap::new()).await {
            Ok(result) => {
                println!("products for {:?}:", text);
                if let Some(trace) = &result.metadata.natural {
                    println!("  extracted by {}: {}", trace.model, trace.raw_output);
                }
                print_result(&result);
            }
            Err(e) if e.is_recoverable() => error!("Natural query failed: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_result(result: &QueryResult) {
    for row in &result.rows {
        let explain: Vec<String> = row
            .explain
            .iter()
            .map(|s| format!("{}={:.3}x{:.2}", s.space, s.similarity, s.weight))
            .collect();
        println!(
            "  {:>4}  {:.4}  [{}]  {}",
            row.id.to_string(),
            row.score,
            explain.join(", "),
            serde_json::to_string(&row.fields).unwrap_or_default()
        );
    }
    println!(
        "  ({} of {} candidates, top space: {})",
        result.metadata.stats.results_count,
        result.metadata.stats.candidates_count,
        result.metadata.stats.top_contributing_space.as_deref().unwrap_or("-")
    );
}
