use std::sync::Arc;

use clap::Parser;
use climate_rag::{
    Config,
    Error,
    Result,
    ServiceContext,
    cli::{
        ChunksArgs,
        Cli,
        Command,
        IngestArgs,
        QueryArgs,
        SearchArgs,
        ServeArgs,
        StatusArgs,
    },
    corpus,
    embedding::HttpEmbedder,
    ingestion::{self, IngestOptions},
    mcp,
    retrieval::SearchResult,
    server,
    service::HealthStatus,
    vector_index::QdrantIndex,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("CLIMATE_RAG_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let config = Config::from_env()?;

    match cli.command {
        Command::Serve(args) => cmd_serve(config, &args),
        Command::Ingest(args) => cmd_ingest(config, &args),
        Command::Search(args) => cmd_search(config, &args),
        Command::Query(args) => cmd_query(config, &args),
        Command::Status(args) => cmd_status(config, &args),
        Command::Chunks(args) => cmd_chunks(&config, &args),
        Command::Mcp => mcp::run_mcp(config),
        Command::Completions(_) => Ok(()),
    }
}

fn cmd_serve(mut config: Config, args: &ServeArgs) -> Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let addr = config.bind_addr;

    runtime()?.block_on(async move {
        let context = ServiceContext::initialize(config).await;
        server::serve(Arc::new(context), addr).await
    })
}

fn cmd_ingest(config: Config, args: &IngestArgs) -> Result<()> {
    let path = args.corpus.as_deref().unwrap_or(config.corpus_path.as_path());
    let document = corpus::load(path)?;
    let chunks = corpus::flatten(&document);

    let embedder = HttpEmbedder::from_config(&config)?;
    let index = QdrantIndex::from_config(&config)?;
    let options = IngestOptions {
        collection: config.collection_name.clone(),
        batch_size: args.batch_size,
        recreate: args.recreate,
        show_progress: !args.no_progress,
    };

    let report = runtime()?.block_on(ingestion::ingest(
        &chunks, &embedder, &index, &options,
    ))?;

    if report.created_collection {
        println!(
            "Created collection '{}' ({} dimensions)",
            options.collection, report.dimension
        );
    }
    println!(
        "Ingested {} chunks into '{}'",
        report.chunks, options.collection
    );
    Ok(())
}

fn cmd_search(config: Config, args: &SearchArgs) -> Result<()> {
    let results = runtime()?.block_on(async {
        let context = ServiceContext::initialize(config).await;
        context
            .retriever
            .retrieve(&args.question, args.count, args.min_score)
            .await
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn cmd_query(config: Config, args: &QueryArgs) -> Result<()> {
    let (results, answer) = runtime()?.block_on(async {
        let context = ServiceContext::initialize(config).await;
        let retriever = &context.retriever;
        let results = retriever
            .retrieve(&args.question, args.count, args.min_score)
            .await?;
        let answer = retriever
            .answer_if(!args.no_llm, &args.question, &results)
            .await
            .into_text();
        Ok::<_, Error>((results, answer))
    })?;

    if args.json {
        let output = json!({
            "question": args.question,
            "answer": answer,
            "search_results": results,
            "total_results": results.len(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match answer {
        Some(text) => println!("{text}\n"),
        None if !args.no_llm => {
            println!("(no answer available, showing passages only)\n")
        }
        None => {}
    }
    print_results(&results);
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} - {}",
            i + 1,
            r.score,
            r.chapter_title,
            r.section_title
        );
        println!("   {}", corpus::content_preview(&r.content));
    }
}

fn cmd_status(config: Config, args: &StatusArgs) -> Result<()> {
    let (report, embedding_model, generator_model) =
        runtime()?.block_on(async {
            let context = ServiceContext::initialize(config).await;
            let report = context.health().await;
            let generator_model = context
                .retriever
                .generator()
                .map(|g| g.model().to_string());
            (report, context.embedding_model().to_string(), generator_model)
        });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let status = match report.status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unhealthy",
    };
    println!("Status: {status}");
    println!("Embedding model: {embedding_model}");
    println!(
        "Generator: {}",
        generator_model.as_deref().unwrap_or("not configured")
    );
    match &report.collection_info {
        Some(info) => {
            println!("Points: {}", info.point_count);
            if let Some(vectors) = info.vector_count {
                println!("Vectors: {vectors}");
            }
            println!("Collection status: {}", info.status);
        }
        None => println!("Collection: not reachable"),
    }
    Ok(())
}

fn cmd_chunks(config: &Config, args: &ChunksArgs) -> Result<()> {
    let path = args.corpus.as_deref().unwrap_or(config.corpus_path.as_path());
    let document = corpus::load(path)?;
    let chunks = corpus::flatten(&document);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    let mut words = 0u64;
    for chunk in &chunks {
        let meta = &chunk.metadata;
        words += u64::from(meta.word_count);
        println!(
            "{}\t{}\t{}\t{}",
            chunk.id, meta.chapter_number, meta.section_type, meta.section_title
        );
    }
    println!(
        "\n{} chunks in {} chapters, {} words",
        chunks.len(),
        document.chapters.len(),
        words
    );
    Ok(())
}
