//! `rca` - run incident root-cause analysis against an offline corpus

mod corpus;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use corpus::Corpus;
use rca_core::logging::{self, LogFormat};
use rca_core::{Orchestrator, RcaConfig, TaskSnapshot, TaskStatus};
use rca_entity::EntityExtractor;
use rca_retrieval::{HybridSearchEngine, SearchOutcome, SearchRequest};
use rca_topology::TopologyAnalyzer;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

fn cli() -> Command {
    Command::new("rca")
        .version(rca_core::VERSION)
        .about("Incident root-cause analysis over logs, metrics, and service topology")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("corpus")
                .long("corpus")
                .global(true)
                .default_value("demos/corpus.json")
                .value_parser(value_parser!(PathBuf))
                .help("JSON file with documents and relations"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print results as JSON"),
        )
        .subcommand(
            Command::new("analyze")
                .about("Run the full pipeline for an incident description")
                .arg(Arg::new("message").required(true).help("Incident description"))
                .arg(
                    Arg::new("user")
                        .long("user")
                        .default_value("cli")
                        .help("Submitting user id"),
                ),
        )
        .subcommand(
            Command::new("search")
                .about("Hybrid evidence search")
                .arg(Arg::new("query").required(true))
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .default_value("5")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("alpha")
                        .long("alpha")
                        .value_parser(value_parser!(f64))
                        .help("Semantic weight in [0, 1]; defaults to the configured value"),
                )
                .arg(
                    Arg::new("service")
                        .long("service")
                        .help("Restrict to one service"),
                ),
        )
        .subcommand(
            Command::new("topology")
                .about("Show relations and impact around services")
                .arg(Arg::new("services").required(true).num_args(1..)),
        )
        .subcommand(
            Command::new("extract")
                .about("Extract service names and metrics from text")
                .arg(Arg::new("text").required(true)),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let format = if matches.get_flag("json-logs") {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    logging::init(format, "warn,rca_core=info");

    let config = load_config(matches.get_one::<PathBuf>("config"))?;
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("analyze", args)) => analyze(&config, corpus_path(&matches), args, json).await,
        Some(("search", args)) => search(&config, corpus_path(&matches), args, json).await,
        Some(("topology", args)) => topology(&config, corpus_path(&matches), args, json).await,
        Some(("extract", args)) => extract(&config, args, json),
        _ => bail!("no subcommand given"),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RcaConfig> {
    match path {
        Some(path) => RcaConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(RcaConfig::default()),
    }
}

fn corpus_path(matches: &ArgMatches) -> &Path {
    matches
        .get_one::<PathBuf>("corpus")
        .map_or_else(|| Path::new("demos/corpus.json"), PathBuf::as_path)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a String> {
    args.get_one::<String>(name)
        .with_context(|| format!("missing argument <{name}>"))
}

async fn analyze(config: &RcaConfig, corpus: &Path, args: &ArgMatches, json: bool) -> Result<()> {
    let message = required(args, "message")?;
    let user = required(args, "user")?;
    let backends = Corpus::load(corpus)?.into_backends()?;
    let orchestrator = Orchestrator::new(config.clone(), backends)?;

    let id = orchestrator.create_task(user.as_str(), message.as_str());
    let poll = config.orchestrator.poll_interval();

    let snapshot = tokio::select! {
        snapshot = watch(&orchestrator, id, poll) => snapshot?,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.interrupt(id, "interrupted from terminal")?;
            orchestrator.get_status(id)?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_report(&snapshot);
    }
    if snapshot.status != TaskStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

/// Poll to completion, echoing progress changes to stderr
async fn watch(
    orchestrator: &Orchestrator,
    id: rca_core::TaskId,
    poll: std::time::Duration,
) -> Result<TaskSnapshot> {
    let mut last = (TaskStatus::Queued, -1.0_f64);
    loop {
        let snapshot = orchestrator.get_status(id)?;
        let now = (snapshot.status, snapshot.overall_progress);
        if now != last {
            let phase = snapshot.current_phase.map_or("-", |p| p.as_str());
            eprintln!(
                "[{:>3.0}%] {} ({phase})",
                snapshot.overall_progress * 100.0,
                snapshot.status
            );
            last = now;
        }
        if snapshot.is_terminal() {
            return Ok(snapshot);
        }
        tokio::time::sleep(poll).await;
    }
}

fn print_report(snapshot: &TaskSnapshot) {
    println!("task {} {}", snapshot.task_id, snapshot.status);
    if let Some(error) = &snapshot.error_message {
        println!("error: {error}");
    }
    if let Some(reason) = &snapshot.interrupt_reason {
        println!("interrupted: {reason}");
    }
    let Some(result) = &snapshot.final_result else {
        return;
    };
    if result.degraded {
        println!("(evidence search ran in degraded mode)");
    }
    println!("\nHypotheses:");
    for h in &result.hypotheses {
        println!("  {:.2}  {}", h.confidence, h.description);
    }
    println!("\nSolutions:");
    for s in &result.solutions {
        println!("  P{} {}", s.priority, s.title);
        for step in &s.steps {
            println!("       - {step}");
        }
    }
    println!("\nEvidence:");
    for e in &result.evidence {
        println!(
            "  {:.2}  [{}] {}: {}",
            e.hybrid_score,
            e.source_type,
            e.service_name.as_deref().unwrap_or("-"),
            e.content
        );
    }
}

async fn search(config: &RcaConfig, corpus: &Path, args: &ArgMatches, json: bool) -> Result<()> {
    let query = required(args, "query")?;
    let limit = args.get_one::<usize>("limit").copied().unwrap_or(5);
    let alpha = args
        .get_one::<f64>("alpha")
        .copied()
        .unwrap_or(config.retrieval.alpha);

    let backends = Corpus::load(corpus)?.into_backends()?;
    let engine = HybridSearchEngine::new(
        backends.embedder,
        backends.vector_store,
        backends.lexical_store,
    )
    .with_config(config.search_config())?
    .with_cache(config.embedding_cache());

    let mut request = SearchRequest::new(query, limit, alpha);
    if let Some(service) = args.get_one::<String>("service") {
        request = request.scoped(service);
    }
    let outcome = engine.search_with(request, &CancellationToken::new()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.items)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome) {
    if let Some(mode) = outcome.degraded {
        println!("degraded: {mode:?}");
        for failure in &outcome.failures {
            println!("  {:?}: {}", failure.branch, failure.reason);
        }
    }
    for item in &outcome.items {
        println!(
            "{:.3} (v {:.3}, l {:.3})  {}: {}",
            item.hybrid_score,
            item.vector_score,
            item.lexical_score,
            item.service_name.as_deref().unwrap_or("-"),
            item.content
        );
    }
    if outcome.filtered > 0 {
        println!("({} records dropped by quality rules)", outcome.filtered);
    }
}

async fn topology(config: &RcaConfig, corpus: &Path, args: &ArgMatches, json: bool) -> Result<()> {
    let services: Vec<String> = args
        .get_many::<String>("services")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    let backends = Corpus::load(corpus)?.into_backends()?;
    let analyzer = TopologyAnalyzer::new(backends.graph_store)
        .with_max_depth(config.topology.max_depth)
        .with_timeout(config.timeouts.store());

    let view = analyzer.get_topology(services.as_slice()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    for relation in &view.relations {
        println!("{relation}");
    }
    println!("impacted: {}", view.impacted.join(", "));
    if view.dropped > 0 {
        println!("({} invalid relations dropped)", view.dropped);
    }
    Ok(())
}

fn extract(config: &RcaConfig, args: &ArgMatches, json: bool) -> Result<()> {
    let text = required(args, "text")?;
    let extractor =
        EntityExtractor::new().with_known_services(config.entity.extra_known_services.clone());
    let entities = extractor.extract(text);

    if json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
    } else {
        println!("services: {}", entities.services.join(", "));
        println!("metrics:  {}", entities.metric_names().join(", "));
    }
    Ok(())
}
