//! CLI binary for receiptflow.
//!
//! A thin shim over the library crate that wires the Supabase adapters and
//! model gateways into a [`CaptureSession`] and prints results.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use receiptflow::{
    budget_report, resolve_provider, AuthService, BlobStore, CaptureConfig, CaptureProgress,
    CaptureSession, CaptureStep, Category, DataStore, DateRange, ImageSource, LineItem,
    ModelStructuringGateway, SupabaseClient, VisionOcrGateway,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner plus one checklist line per pipeline step,
/// mirroring the capture screen's step list.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl CaptureProgress for CliProgress {
    fn on_capture_start(&self, _total_steps: usize) {
        self.bar.set_message("Processing receipt…");
    }

    fn on_step_start(&self, step: CaptureStep) {
        self.bar.set_message(step.label().to_string());
    }

    fn on_step_complete(&self, step: CaptureStep) {
        self.bar.println(format!("  {} {}", green("✓"), step.label()));
    }

    fn on_step_error(&self, step: CaptureStep, error: &str) {
        self.bar
            .println(format!("  {} {}  {}", red("✗"), step.label(), red(error)));
    }

    fn on_capture_complete(&self, _success: bool) {
        self.bar.finish_and_clear();
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan a receipt photo and review the extraction (nothing saved)
  receiptflow scan receipt.jpg

  # Scan, fix the merchant, and save
  receiptflow scan receipt.jpg --merchant "Cafe X" --save

  # Enter a receipt by hand; the total is computed from the items
  receiptflow manual --merchant "Corner Deli" --date 2024-01-05 \
      --item "Coffee:15000:2" --item "Bagel:20000:1" --save

  # List January's receipts as JSON
  receiptflow list --start 2024-01-01 --end 2024-01-31 --json

  # Budgets: set one, then compare against spending
  receiptflow budget set Food 500000
  receiptflow budget status

  # Sign in to obtain a user id and access token
  receiptflow login --email me@example.com --password secret

ENVIRONMENT VARIABLES:
  SUPABASE_URL             Project base URL
  SUPABASE_KEY             Project anon/service API key
  SUPABASE_ACCESS_TOKEN    User access token (from `receiptflow login`)
  RECEIPTFLOW_USER_ID      User id owning the rows
  OPENAI_API_KEY           OpenAI API key
  ANTHROPIC_API_KEY        Anthropic API key
  GEMINI_API_KEY           Google Gemini API key
  RECEIPTFLOW_LLM_PROVIDER Override provider (openai, anthropic, gemini, ollama)
  RECEIPTFLOW_MODEL        Override model ID
"#;

#[derive(Parser)]
#[command(
    name = "receiptflow",
    version,
    about = "Turn receipt photos into structured expense records",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Supabase project base URL.
    #[arg(long, env = "SUPABASE_URL", global = true)]
    supabase_url: Option<String>,

    /// Supabase API key.
    #[arg(long, env = "SUPABASE_KEY", global = true)]
    supabase_key: Option<String>,

    /// User access token for row-level-security scoping.
    #[arg(long, env = "SUPABASE_ACCESS_TOKEN", global = true)]
    access_token: Option<String>,

    /// User id owning the receipts.
    #[arg(long, env = "RECEIPTFLOW_USER_ID", global = true)]
    user_id: Option<String>,

    /// Model identifier, e.g. gpt-4.1-nano, gemini-2.0-flash.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Provider name (openai, anthropic, gemini, ollama).
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a receipt photo through upload → OCR → structuring → review.
    Scan {
        /// Path to the receipt image (jpeg/png).
        image: PathBuf,

        /// Review edits applied before saving.
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        total: Option<f64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        notes: Option<String>,

        /// Commit the reviewed draft to the data store.
        #[arg(long)]
        save: bool,

        /// Print the draft as JSON instead of the summary.
        #[arg(long)]
        json: bool,
    },

    /// Enter a receipt by hand; no OCR or structuring involved.
    Manual {
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        notes: Option<String>,

        /// Line item as "name:price:quantity". Repeatable.
        #[arg(long = "item")]
        items: Vec<String>,

        /// Commit the entry to the data store.
        #[arg(long)]
        save: bool,
    },

    /// List stored receipts, newest first.
    List {
        /// Start date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date (YYYY-MM-DD), inclusive through end of day.
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Print rows as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Category budgets.
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },

    /// Sign in and print the user id and access token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum BudgetCommand {
    /// Set (insert or replace) the budget for one category.
    Set { category: String, amount: f64 },
    /// Show spending against budgets per category.
    Status,
}

// ── Wiring helpers ───────────────────────────────────────────────────────────

fn supabase(cli: &Cli) -> Result<Arc<SupabaseClient>> {
    let url = cli
        .supabase_url
        .clone()
        .ok_or_else(|| anyhow!("missing --supabase-url (or SUPABASE_URL)"))?;
    let key = cli
        .supabase_key
        .clone()
        .ok_or_else(|| anyhow!("missing --supabase-key (or SUPABASE_KEY)"))?;

    let mut client = SupabaseClient::new(url, key)?;
    if let Some(token) = &cli.access_token {
        client = client.with_access_token(token.clone());
    }
    Ok(Arc::new(client))
}

fn user_id(cli: &Cli) -> Result<String> {
    cli.user_id
        .clone()
        .ok_or_else(|| anyhow!("missing --user-id (or RECEIPTFLOW_USER_ID)"))
}

fn capture_config(cli: &Cli) -> Result<CaptureConfig> {
    let mut builder = CaptureConfig::builder();
    if let Some(model) = &cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    Ok(builder.build()?)
}

/// Parse one `--item "name:price:quantity"` argument.
fn parse_item(spec: &str) -> Result<LineItem> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        bail!("item '{spec}' must be name:price:quantity");
    }
    let price: f64 = parts[1]
        .parse()
        .with_context(|| format!("item '{spec}': price is not a number"))?;
    let quantity: f64 = parts[2]
        .parse()
        .with_context(|| format!("item '{spec}': quantity is not a number"))?;
    Ok(LineItem::new(parts[0], price, quantity))
}

fn guess_mime(path: &PathBuf) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

fn print_draft_summary(draft: &receiptflow::ReceiptDraft) {
    println!("{}", bold("Extracted receipt"));
    println!("  Merchant:  {}", or_dash(&draft.merchant_name));
    println!("  Date:      {}", or_dash(&draft.date));
    println!(
        "  Total:     {}",
        draft
            .total_amount
            .map(|t| format!("{t}"))
            .unwrap_or_else(|| "—".to_string())
    );
    println!("  Category:  {}", draft.category);
    if !draft.line_items.is_empty() {
        println!("  Items:");
        for item in &draft.line_items {
            println!(
                "    {:<24} {:>10} × {}",
                item.name, item.price, item.quantity
            );
        }
    }
    if let Some(url) = &draft.image_url {
        println!("  Image:     {}", dim(url));
    }
}

fn or_dash(s: &str) -> String {
    if s.is_empty() {
        "—".to_string()
    } else {
        s.to_string()
    }
}

fn draft_json(draft: &receiptflow::ReceiptDraft) -> serde_json::Value {
    serde_json::json!({
        "merchant_name": draft.merchant_name,
        "date": draft.date,
        "total_amount": draft.total_amount,
        "category": draft.category,
        "notes": draft.notes,
        "line_items": draft.line_items,
        "image_url": draft.image_url,
        "ocr_text": draft.ocr_text,
        "raw_extraction": draft.raw_extraction,
    })
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
async fn cmd_scan(
    cli: &Cli,
    image: PathBuf,
    merchant: Option<String>,
    date: Option<String>,
    total: Option<f64>,
    category: Option<String>,
    notes: Option<String>,
    save: bool,
    json: bool,
) -> Result<()> {
    let store = supabase(cli)?;
    let user = user_id(cli)?;
    let config = capture_config(cli)?;
    let provider = resolve_provider(&config)?;

    let bytes = std::fs::read(&image)
        .with_context(|| format!("could not read image '{}'", image.display()))?;
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "receipt.jpg".to_string());

    let data: Arc<dyn DataStore> = store.clone();
    let blob: Arc<dyn BlobStore> = store;
    let mut session = CaptureSession::new(
        user,
        Arc::new(VisionOcrGateway::new(provider.clone(), config.clone())),
        Arc::new(ModelStructuringGateway::new(provider, config)),
        data,
        blob,
    )
    .with_progress(CliProgress::new());

    session.select_image(ImageSource::new(bytes, file_name, guess_mime(&image)))?;
    session.process().await?;

    // Apply review edits from flags.
    {
        let draft = session.draft_mut()?;
        if let Some(v) = merchant {
            draft.merchant_name = v;
        }
        if let Some(v) = date {
            draft.date = v;
        }
        if let Some(v) = total {
            draft.total_amount = Some(v);
        }
        if let Some(v) = category {
            draft.category = Category::from_label(&v);
        }
        if let Some(v) = notes {
            draft.notes = v;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&draft_json(session.draft()))?);
    } else {
        print_draft_summary(session.draft());
    }

    if save {
        let saved = session.save().await?;
        eprintln!("{} saved receipt {}", green("✔"), bold(&saved.id));
    } else {
        eprintln!("{}", dim("not saved — re-run with --save to commit"));
    }
    Ok(())
}

async fn cmd_manual(
    cli: &Cli,
    merchant: Option<String>,
    date: Option<String>,
    category: Option<String>,
    notes: Option<String>,
    items: Vec<String>,
    save: bool,
) -> Result<()> {
    let store = supabase(cli)?;
    let user = user_id(cli)?;
    let config = capture_config(cli)?;

    let line_items: Vec<LineItem> = items
        .iter()
        .map(|s| parse_item(s))
        .collect::<Result<Vec<_>>>()?;

    let data: Arc<dyn DataStore> = store.clone();
    let blob: Arc<dyn BlobStore> = store;
    let provider = resolve_provider(&config).ok();
    let (ocr, structurer): (
        Arc<dyn receiptflow::OcrGateway>,
        Arc<dyn receiptflow::StructuringGateway>,
    ) = match provider {
        Some(p) => (
            Arc::new(VisionOcrGateway::new(p.clone(), config.clone())),
            Arc::new(ModelStructuringGateway::new(p, config)),
        ),
        // No provider configured: fine for manual entry, which never
        // touches the model.
        None => (Arc::new(NoModelGateway), Arc::new(NoModelGateway)),
    };

    let mut session = CaptureSession::new(user, ocr, structurer, data, blob);
    session.begin_manual()?;
    {
        let draft = session.draft_mut()?;
        draft.merchant_name = merchant.unwrap_or_default();
        draft.date = date.unwrap_or_default();
        draft.category = category
            .as_deref()
            .map(Category::from_label)
            .unwrap_or_default();
        draft.notes = notes.unwrap_or_default();
        draft.line_items = line_items;
    }

    print_draft_summary(session.draft());

    if save {
        let saved = session.save().await?;
        eprintln!(
            "{} saved receipt {} (total {})",
            green("✔"),
            bold(&saved.id),
            saved.total_amount.unwrap_or(0.0)
        );
    } else {
        eprintln!("{}", dim("not saved — re-run with --save to commit"));
    }
    Ok(())
}

async fn cmd_list(
    cli: &Cli,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let store = supabase(cli)?;
    let user = user_id(cli)?;

    let range = (start.is_some() || end.is_some()).then(|| DateRange::new(start, end));
    let rows = store.list_receipts(&user, range.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("no receipts");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{}  {:<10}  {:<24} {:<13} {:>12}",
            dim(&row.created_at.format("%Y-%m-%d").to_string()),
            or_dash(&row.date),
            or_dash(&row.merchant_name),
            row.category.to_string(),
            row.total_amount
                .map(|t| format!("{t}"))
                .unwrap_or_else(|| "—".to_string()),
        );
    }
    eprintln!("{}", dim(&format!("{} receipts", rows.len())));
    Ok(())
}

async fn cmd_budget(cli: &Cli, command: &BudgetCommand) -> Result<()> {
    let store = supabase(cli)?;
    let user = user_id(cli)?;

    match command {
        BudgetCommand::Set { category, amount } => {
            if *amount < 0.0 {
                bail!("budget amount must be ≥ 0");
            }
            let budget = store
                .upsert_budget(&user, Category::from_label(category), *amount)
                .await?;
            eprintln!(
                "{} {} budget set to {}",
                green("✔"),
                budget.category,
                budget.budget_amount
            );
        }
        BudgetCommand::Status => {
            let receipts = store.list_receipts(&user, None).await?;
            let budgets = store.list_budgets(&user).await?;
            let report = budget_report(&receipts, &budgets);
            if report.is_empty() {
                println!("no spending or budgets yet");
                return Ok(());
            }
            for line in &report {
                let marker = if line.is_over() { red("over") } else { String::new() };
                println!(
                    "{:<13} {:>12} / {:>12}  {}",
                    line.category.to_string(),
                    line.spent,
                    line.budget,
                    marker
                );
            }
        }
    }
    Ok(())
}

async fn cmd_login(cli: &Cli, email: String, password: String) -> Result<()> {
    let store = supabase(cli)?;
    let session = store.sign_in(&email, &password).await?;
    println!("user id:      {}", session.user.id);
    println!("access token: {}", session.access_token);
    eprintln!(
        "{}",
        dim("export RECEIPTFLOW_USER_ID and SUPABASE_ACCESS_TOKEN to use them")
    );
    Ok(())
}

/// Gateway used when no model provider is configured; only ever reached if
/// a scan is attempted without one.
struct NoModelGateway;

#[async_trait::async_trait]
impl receiptflow::OcrGateway for NoModelGateway {
    async fn extract_text(
        &self,
        _image: &ImageSource,
    ) -> Result<String, receiptflow::CaptureError> {
        Err(receiptflow::CaptureError::ProviderNotConfigured {
            provider: "none".into(),
            hint: "set OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY".into(),
        })
    }
}

#[async_trait::async_trait]
impl receiptflow::StructuringGateway for NoModelGateway {
    async fn extract(&self, _ocr_text: &str) -> Result<String, receiptflow::CaptureError> {
        Err(receiptflow::CaptureError::ProviderNotConfigured {
            provider: "none".into(),
            hint: "set OPENAI_API_KEY, ANTHROPIC_API_KEY, or GEMINI_API_KEY".into(),
        })
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Scan {
            image,
            merchant,
            date,
            total,
            category,
            notes,
            save,
            json,
        } => {
            cmd_scan(
                &cli,
                image.clone(),
                merchant.clone(),
                date.clone(),
                *total,
                category.clone(),
                notes.clone(),
                *save,
                *json,
            )
            .await
        }
        Command::Manual {
            merchant,
            date,
            category,
            notes,
            items,
            save,
        } => {
            cmd_manual(
                &cli,
                merchant.clone(),
                date.clone(),
                category.clone(),
                notes.clone(),
                items.clone(),
                *save,
            )
            .await
        }
        Command::List { start, end, json } => cmd_list(&cli, *start, *end, *json).await,
        Command::Budget { command } => cmd_budget(&cli, command).await,
        Command::Login { email, password } => {
            cmd_login(&cli, email.clone(), password.clone()).await
        }
    }
}
