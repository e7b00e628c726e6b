use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use search_paging::config;
use search_paging::db::{self, Session};
use search_paging::models::{Article, CreateArticleRequest};
use search_paging::search::{Query, SearchFactory};
use search_paging::Paginator;

/// Full-text search over stored articles, one page at a time
#[derive(Parser)]
#[command(name = "search-paging", version, about)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, env = "SEARCH_PAGING_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an article and index it.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    /// Delete an article and its index entry.
    Delete {
        id: i64,
    },
    /// Rebuild the article index from the database.
    Reindex,
    /// Search articles and print one page of results.
    Search {
        /// Query string: plain terms, +required, -excluded, prefix*
        query: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Page size; defaults to paging.default_page_size
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show index statistics.
    Stats,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "search_paging=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    tracing::info!("search-paging built at {}", env!("BUILD_TIME"));

    // Load configuration / 加载配置
    config::init_config(&cli.config).map_err(anyhow::Error::msg)?;
    let app_config = config::config();

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let pool = db::connect(&app_config.get_database_url()).await?;
    db::run_migrations(&pool).await?;
    let session = Session::new(pool);

    let factory = Arc::new(SearchFactory::from_config(&app_config));
    factory.register_sharded::<Article>(app_config.search.shards);

    let result = run(cli.command, &session, &factory, app_config.paging.default_page_size).await;

    factory.shutdown().await;
    session.pool().close().await;
    result
}

async fn run(
    command: Command,
    session: &Session,
    factory: &Arc<SearchFactory>,
    default_page_size: usize,
) -> anyhow::Result<()> {
    match command {
        Command::Add { title, body } => {
            let article = db::insert_article(session.pool(), &CreateArticleRequest { title, body }).await?;
            factory
                .writer()
                .index(&article)
                .await
                .context("Article stored but could not be indexed")?;
            print_json(&article)
        }
        Command::Delete { id } => {
            let deleted = db::delete_article(session.pool(), id).await?;
            let unindexed = factory.writer().delete::<Article>(id).await?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted, "unindexed": unindexed }))
        }
        Command::Reindex => {
            let indexed = factory.writer().reindex::<Article>(session).await?;
            print_json(&serde_json::json!({ "indexed": indexed }))
        }
        Command::Search { query, offset, limit } => {
            let paginator: Paginator<Article> = Paginator::new(Arc::clone(factory));
            let page = paginator
                .try_list(session, &Query::parse(&query), offset, limit.unwrap_or(default_page_size))
                .await?;
            print_json(&page)
        }
        Command::Stats => {
            let stats = factory.writer().stats::<Article>().await?;
            let partitions = factory.targeted_partitions::<Article>()?;
            print_json(&serde_json::json!({
                "entities": factory.bindings().entities(),
                "partitions": partitions,
                "stats": stats,
            }))
        }
    }
}
