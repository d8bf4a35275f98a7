// tactus/src/main.rs
//
// Tactus: adaptive multi-modal behavioral biometric authentication
//
// Three operational modes:
//   replay     run recorded sessions through the full pipeline (learning on)
//   eval       FAR / FRR / EER over a labeled corpus
//   recommend  advisory sampling plan for a user and context
//
// Usage:
//   tactus --mode replay --path sessions.jsonl --output decisions.jsonl
//   tactus --mode eval --path corpus.jsonl --json
//   tactus --mode recommend --user alice --context ctx.json

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tactus::eval::{parse_sessions, report, Evaluator};
use tactus::store::{MemoryProfileStore, StaticProbe};
use tactus::{AuthDecision, AuthPipeline, EngineConfig, SamplingContext};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "tactus",
    about   = "Adaptive multi-modal behavioral biometric authentication",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "replay")]
    mode: Mode,

    #[arg(long, default_value = "sessions.jsonl",
          help = "Recorded session JSONL (replay/eval modes)")]
    path: PathBuf,

    #[arg(long, help = "Engine config JSON; defaults apply to missing fields")]
    config: Option<PathBuf>,

    #[arg(long, help = "Claimed user (recommend mode, or override in replay mode)")]
    user: Option<String>,

    #[arg(long, help = "SamplingContext JSON (recommend mode)")]
    context: Option<PathBuf>,

    #[arg(long, help = "Append every decision as JSONL (replay mode)")]
    output: Option<PathBuf>,

    #[arg(long, help = "Append every captured pattern as JSONL (replay mode)")]
    audit_log: Option<PathBuf>,

    #[arg(long, help = "Print the eval report as JSON instead of markdown")]
    json: bool,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Replay,     // recorded sessions through the full pipeline
    Eval,       // labeled corpus → FAR / FRR / EER
    Recommend,  // sampling plan only, no state
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_banner() {
    println!("\x1b[1m");
    println!(" ████████╗ █████╗  ██████╗████████╗██╗   ██╗███████╗");
    println!(" ╚══██╔══╝██╔══██╗██╔════╝╚══██╔══╝██║   ██║██╔════╝");
    println!("    ██║   ███████║██║        ██║   ██║   ██║███████╗");
    println!("    ██║   ██╔══██║██║        ██║   ██║   ██║╚════██║");
    println!("    ██║   ██║  ██║╚██████╗   ██║   ╚██████╔╝███████║");
    println!("    ╚═╝   ╚═╝  ╚═╝ ╚═════╝   ╚═╝    ╚═════╝ ╚══════╝");
    println!("\x1b[0m");
    println!("  \x1b[90mKeystroke · pointer · touch behavioral authentication | Rust\x1b[0m");
    println!("  \x1b[90mgithub.com/m0rs3c0d3/tactus\x1b[0m\n");
}

fn print_decision(d: &AuthDecision) {
    let (color, icon, verdict) = if d.success {
        ("\x1b[92;1m", "🟢", "ACCEPT")
    } else if d.modalities_used.is_empty() {
        ("\x1b[90m", "⚪", "NO INPUT")
    } else {
        ("\x1b[91;1m", "🔴", "REJECT")
    };
    let reset  = "\x1b[0m";
    let scores = d
        .per_modality_scores
        .iter()
        .map(|(m, s)| format!("{}={:.1}", m, s))
        .collect::<Vec<_>>()
        .join(" | ");
    let issues = d.issues.iter().take(3).map(|i| i.to_string()).collect::<Vec<_>>().join(" | ");

    println!("\n{}{} {} {}{}",         color, icon, verdict, d.attempt_id, reset);
    println!("  User      : {}{}{}",    color, d.user_id, reset);
    println!("  Confidence: {}{:.2}{}", color, d.confidence, reset);
    println!("  Risk      : {:.2}  uncertainty={:.2}", d.risk_score, d.uncertainty);
    println!("  Modalities: {}", if scores.is_empty() { "-".to_string() } else { scores });
    println!("  Sampled   : {} ms  phase={}", d.sampling_duration_ms, d.phase);
    if !issues.is_empty() {
        println!("  Issues    : \x1b[90m{}{}", issues, reset);
    }
}

// ── Modes ─────────────────────────────────────────────────────────────────────

async fn append_jsonl(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path).await?;
    f.write_all(format!("{}\n", line).as_bytes()).await?;
    Ok(())
}

async fn run_replay(cli: &Cli, cfg: EngineConfig) -> Result<()> {
    let store = match &cli.audit_log {
        Some(p) => MemoryProfileStore::with_audit_log(p),
        None    => MemoryProfileStore::new(),
    };
    let pipeline = AuthPipeline::new(cfg, Arc::new(store), Arc::new(StaticProbe::default()))?;

    let content = tokio::fs::read_to_string(&cli.path)
        .await
        .with_context(|| format!("reading {}", cli.path.display()))?;
    let sessions = parse_sessions(&content);
    info!("replaying {} sessions from {}", sessions.len(), cli.path.display());

    let start        = Instant::now();
    let mut accepted = 0usize;
    let mut decided  = 0usize;
    for s in &sessions {
        let user = cli.user.as_deref().unwrap_or(&s.user_id);
        let decision = match pipeline.authenticate_recorded(user, s.context.clone(), &s.samples).await {
            Ok(d) => d,
            Err(e) => {
                warn!("session for {}: {}", user, e);
                continue;
            }
        };
        decided += 1;
        if decision.success {
            accepted += 1;
        }
        print_decision(&decision);
        if let Some(out) = &cli.output {
            append_jsonl(out, &decision.to_jsonl())
                .await
                .with_context(|| format!("writing {}", out.display()))?;
        }
    }

    println!(
        "\n\x1b[1m── replay  sessions={}  decided={}  accepted={}  templates={}  updates={}  elapsed={:.2}s ──\x1b[0m",
        sessions.len(),
        decided,
        accepted,
        pipeline.templates().n_templates(),
        pipeline.templates().total_updates(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn run_eval(cli: &Cli, cfg: EngineConfig) -> Result<()> {
    let result = Evaluator::new(cfg).run_dataset(&cli.path).await?;
    if cli.json {
        println!("{}", report::to_json(&result));
    } else {
        println!("{}", report::render_markdown(&result));
    }
    Ok(())
}

async fn run_recommend(cli: &Cli, cfg: EngineConfig) -> Result<()> {
    let context: SamplingContext = match &cli.context {
        Some(p) => {
            let raw = tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("reading {}", p.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", p.display()))?
        }
        None => SamplingContext::default(),
    };
    let user     = cli.user.as_deref().unwrap_or("anonymous");
    let pipeline = AuthPipeline::in_memory(cfg)?;
    let rec      = pipeline.get_recommendations(user, &context);
    println!("{}", serde_json::to_string_pretty(&rec)?);
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("tactus=info".parse()?))
        .compact().init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(p) => EngineConfig::load(p)?,
        None    => EngineConfig::default(),
    };

    match cli.mode {
        Mode::Replay => {
            print_banner();
            println!("  Mode: \x1b[93mREPLAY\x1b[0m  |  {}", cli.path.display());
            if let Some(out) = &cli.output {
                println!("  Output: \x1b[90m{}\x1b[0m", out.display());
            }
            println!();
            run_replay(&cli, cfg).await
        }
        Mode::Eval => {
            if !cli.json {
                print_banner();
                println!("  Mode: \x1b[96mEVAL\x1b[0m  |  {}\n", cli.path.display());
            }
            run_eval(&cli, cfg).await
        }
        Mode::Recommend => run_recommend(&cli, cfg).await,
    }
}
