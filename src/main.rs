use std::io;

use clap::Parser;
use groundrag::{
    Settings,
    build_pipeline,
    cli::{AskArgs, ChunksArgs, Cli, Command, PromptArgs, SearchArgs},
    error,
    mcp,
    pipeline::RagPipeline,
    repl,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("GROUNDRAG_LOG") {
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

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let settings = Settings::resolve(&cli)?;

    match cli.command {
        Command::Ask(args) => {
            let pipeline = build_pipeline(&settings)?;
            cmd_ask(&pipeline, &args)?;
        }
        Command::Chat => {
            let pipeline = build_pipeline(&settings)?;
            repl::run(
                &pipeline,
                io::stdin().lock(),
                &mut io::stdout(),
                &mut io::stderr(),
            )?;
        }
        Command::Search(args) => {
            let pipeline = build_pipeline(&settings)?;
            cmd_search(&pipeline, &args)?;
        }
        Command::Prompt(args) => {
            let pipeline = build_pipeline(&settings)?;
            cmd_prompt(&pipeline, &args)?;
        }
        Command::Chunks(args) => {
            cmd_chunks(&settings, &args)?;
        }
        Command::Mcp => {
            let pipeline = build_pipeline(&settings)?;
            mcp::run_mcp(pipeline)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_ask(pipeline: &RagPipeline, args: &AskArgs) -> error::Result<()> {
    let answer = pipeline.answer(&args.query);

    if args.show_prompt
        && let Some(prompt) = &answer.prompt
    {
        eprintln!("{prompt}\n---");
    }

    if args.json {
        let value = json!({
            "query": args.query,
            "answer": answer,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", answer.text.trim_end());
    }
    Ok(())
}

fn cmd_search(pipeline: &RagPipeline, args: &SearchArgs) -> error::Result<()> {
    let retrieval = pipeline.retrieve(&args.query)?;
    let chunks = retrieval.chunks();

    if args.json {
        let value = json!({
            "query": args.query,
            "result_count": chunks.len(),
            "results": chunks,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if chunks.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }

    for (rank, c) in chunks.iter().enumerate() {
        println!("{:>3}. [{:.3}] {} {}", rank + 1, c.score, c.document, c.id);
        println!("     {}", c.text);
    }
    println!("\n{} result(s)", chunks.len());
    Ok(())
}

fn cmd_prompt(pipeline: &RagPipeline, args: &PromptArgs) -> error::Result<()> {
    println!("{}", pipeline.prompt(&args.query)?);
    Ok(())
}

fn cmd_chunks(settings: &Settings, args: &ChunksArgs) -> error::Result<()> {
    let corpus = settings.corpus.load()?;
    let chunks = corpus.chunks(settings.chunking)?;

    if args.json {
        let items: Vec<_> = chunks
            .iter()
            .map(|c| {
                json!({
                    "ordinal": c.ordinal,
                    "id": c.id.to_string(),
                    "document": c.document,
                    "text": c.text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for c in &chunks {
        println!("{:>4} {} {}: {}", c.ordinal, c.id, c.document, c.text);
    }
    eprintln!(
        "{} chunk(s) from {} document(s)",
        chunks.len(),
        corpus.len()
    );
    Ok(())
}
