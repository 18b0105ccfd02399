use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stock_ledger_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::{
        grn_header,
        stock_movement::{self, MovementType},
    },
    events::{Event, EventSender},
    migrator,
    services::{
        goods_receipt::GrnListFilter,
        stock_adjustment::AdjustStockInput,
        stock_queries::{MovementHistoryFilter, StockLevelView},
        AppServices,
    },
    PaginatedResponse,
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Stock(command) => handle_stock_command(&context, command, cli.json).await?,
        Commands::Movements(command) => handle_movements_command(&context, command, cli.json).await?,
        Commands::Grns(command) => handle_grns_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "ledger", about = "Stock ledger CLI for balances, movements, and goods receipts", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply any pending schema migrations to the configured database
    Migrate,
    #[command(subcommand)]
    Stock(StockCommands),
    #[command(subcommand)]
    Movements(MovementsCommands),
    #[command(subcommand)]
    Grns(GrnsCommands),
}

#[derive(Subcommand)]
enum StockCommands {
    Levels(StockLevelsArgs),
    Show(ShowStockArgs),
    Low(LocationFilterArgs),
    OutOfStock(LocationFilterArgs),
    Adjust(AdjustStockArgs),
}

#[derive(Subcommand)]
enum MovementsCommands {
    List(ListMovementsArgs),
}

#[derive(Subcommand)]
enum GrnsCommands {
    List(ListGrnsArgs),
    Get(GetGrnArgs),
}

#[derive(Args)]
struct StockLevelsArgs {
    #[arg(long, default_value_t = 1, help = "Page number (1-indexed)")]
    page: u64,
    #[arg(long, default_value_t = 20, help = "Rows per page", value_parser = parse_positive_u64)]
    limit: u64,
    #[arg(long, help = "Filter by location code")]
    location: Option<String>,
    #[arg(long, help = "Filter by product identifier")]
    product_id: Option<i64>,
}

#[derive(Args)]
struct ShowStockArgs {
    #[arg(long, help = "Product identifier")]
    product_id: i64,
    #[arg(long, help = "Location code")]
    location: String,
}

#[derive(Args)]
struct LocationFilterArgs {
    #[arg(long, help = "Restrict the report to one location code")]
    location: Option<String>,
}

#[derive(Args)]
struct AdjustStockArgs {
    #[arg(long, help = "Product identifier")]
    product_id: i64,
    #[arg(long, help = "Location code")]
    location: String,
    #[arg(
        long,
        allow_hyphen_values = true,
        help = "Signed quantity change; positive writes stock up, negative writes it down"
    )]
    change: i64,
    #[arg(long, help = "Reason recorded on the movement for audit")]
    reason: String,
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Operator identifier (UUID) recorded on the movement")]
    actor: Uuid,
}

#[derive(Args)]
struct ListMovementsArgs {
    #[arg(long, default_value_t = 1, help = "Page number (1-indexed)")]
    page: u64,
    #[arg(long, default_value_t = 20, help = "Rows per page", value_parser = parse_positive_u64)]
    limit: u64,
    #[arg(long, help = "Filter by product identifier")]
    product_id: Option<i64>,
    #[arg(long, help = "Filter by location code")]
    location: Option<String>,
    #[arg(long, value_enum, help = "Filter by movement type")]
    movement_type: Option<MovementTypeArg>,
    #[arg(long, help = "Filter by document reference number (exact match)")]
    reference: Option<String>,
    #[arg(
        long,
        value_parser = parse_datetime,
        help = "Movements recorded at or after this RFC3339 timestamp"
    )]
    from: Option<DateTime<Utc>>,
    #[arg(
        long,
        value_parser = parse_datetime,
        help = "Movements recorded at or before this RFC3339 timestamp"
    )]
    to: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct ListGrnsArgs {
    #[arg(long, default_value_t = 1, help = "Page number (1-indexed)")]
    page: u64,
    #[arg(long, default_value_t = 20, help = "Rows per page", value_parser = parse_positive_u64)]
    limit: u64,
    #[arg(long, value_enum, help = "Filter by document status")]
    status: Option<GrnStatusArg>,
    #[arg(long, help = "Filter by vendor identifier")]
    vendor_id: Option<i64>,
    #[arg(long, help = "Received on or after this date (YYYY-MM-DD)")]
    received_from: Option<NaiveDate>,
    #[arg(long, help = "Received on or before this date (YYYY-MM-DD)")]
    received_to: Option<NaiveDate>,
}

#[derive(Args)]
struct GetGrnArgs {
    #[arg(long, help = "GRN identifier")]
    id: i64,
}

#[derive(Clone, Copy, ValueEnum)]
enum MovementTypeArg {
    Receipt,
    AdjustmentIncrease,
    TransferIn,
    Return,
    Issue,
    AdjustmentDecrease,
    TransferOut,
}

impl From<MovementTypeArg> for MovementType {
    fn from(value: MovementTypeArg) -> Self {
        match value {
            MovementTypeArg::Receipt => MovementType::Receipt,
            MovementTypeArg::AdjustmentIncrease => MovementType::AdjustmentIncrease,
            MovementTypeArg::TransferIn => MovementType::TransferIn,
            MovementTypeArg::Return => MovementType::Return,
            MovementTypeArg::Issue => MovementType::Issue,
            MovementTypeArg::AdjustmentDecrease => MovementType::AdjustmentDecrease,
            MovementTypeArg::TransferOut => MovementType::TransferOut,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GrnStatusArg {
    Draft,
    Received,
    Posted,
    Cancelled,
}

impl From<GrnStatusArg> for grn_header::GrnStatus {
    fn from(value: GrnStatusArg) -> Self {
        match value {
            GrnStatusArg::Draft => grn_header::GrnStatus::Draft,
            GrnStatusArg::Received => grn_header::GrnStatus::Received,
            GrnStatusArg::Posted => grn_header::GrnStatus::Posted,
            GrnStatusArg::Cancelled => grn_header::GrnStatus::Cancelled,
        }
    }
}

struct CliContext {
    config: AppConfig,
    services: AppServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        db::check_connection(&db_pool)
            .await
            .context("database did not answer a ping")?;
        let db: Arc<DbPool> = Arc::new(db_pool);

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = Arc::new(EventSender::new(event_tx));

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "ledger_cli", event = ?event, "received async event");
            }
        });

        let services = AppServices::new(db, event_sender);

        Ok(Self { config, services })
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    migrator::run_migration(context.config.database_url())
        .await
        .context("failed to run database migrations")?;
    println!("Database schema is up to date");
    Ok(())
}

async fn handle_stock_command(
    context: &CliContext,
    command: StockCommands,
    json: bool,
) -> Result<()> {
    match command {
        StockCommands::Levels(args) => {
            let (items, total) = context
                .services
                .queries
                .list_stock_levels(args.page, args.limit, args.location, args.product_id)
                .await
                .context("failed to list stock levels")?;
            if json {
                print_json(&PaginatedResponse::new(items, total, args.page, args.limit))?;
            } else {
                println!(
                    "Stock levels page {} ({} per page) total {}",
                    args.page, args.limit, total
                );
                for view in &items {
                    render_stock_level(view);
                }
            }
            Ok(())
        }
        StockCommands::Show(args) => {
            let view = context
                .services
                .queries
                .get_stock_level(args.product_id, &args.location)
                .await
                .with_context(|| {
                    format!(
                        "failed to fetch stock level for product {} at {}",
                        args.product_id, args.location
                    )
                })?;
            if json {
                print_json(&view)?;
            } else {
                render_stock_level(&view);
            }
            Ok(())
        }
        StockCommands::Low(args) => {
            let rows = context
                .services
                .queries
                .low_stock(args.location)
                .await
                .context("failed to fetch low stock report")?;
            render_report("Low stock", &rows, json)
        }
        StockCommands::OutOfStock(args) => {
            let rows = context
                .services
                .queries
                .out_of_stock(args.location)
                .await
                .context("failed to fetch out-of-stock report")?;
            render_report("Out of stock", &rows, json)
        }
        StockCommands::Adjust(args) => {
            let result = context
                .services
                .adjustments
                .adjust_stock(AdjustStockInput {
                    product_id: args.product_id,
                    location: args.location,
                    quantity_change: args.change,
                    reason: args.reason,
                    created_by: args.actor,
                })
                .await
                .context("failed to adjust stock")?;
            if json {
                print_json(&result)?;
            } else {
                println!(
                    "Adjusted product {} at {}: {} -> {} on hand (movement #{})",
                    result.product_id,
                    result.location,
                    result.quantity_before,
                    result.new_on_hand,
                    result.movement_id
                );
            }
            Ok(())
        }
    }
}

async fn handle_movements_command(
    context: &CliContext,
    command: MovementsCommands,
    json: bool,
) -> Result<()> {
    match command {
        MovementsCommands::List(args) => {
            let filter = MovementHistoryFilter {
                product_id: args.product_id,
                location: args.location.clone(),
                movement_type: args.movement_type.map(Into::into),
                reference_number: args.reference.clone(),
                from: args.from.map(Into::into),
                to: args.to.map(Into::into),
            };
            let (movements, total) = context
                .services
                .queries
                .movement_history(args.page, args.limit, filter)
                .await
                .context("failed to list movements")?;
            if json {
                print_json(&PaginatedResponse::new(
                    movements, total, args.page, args.limit,
                ))?;
            } else {
                println!(
                    "Movements page {} ({} per page) total {}",
                    args.page, args.limit, total
                );
                for movement in &movements {
                    render_movement(movement);
                }
            }
            Ok(())
        }
    }
}

async fn handle_grns_command(context: &CliContext, command: GrnsCommands, json: bool) -> Result<()> {
    match command {
        GrnsCommands::List(args) => {
            let filter = GrnListFilter {
                status: args.status.map(Into::into),
                vendor_id: args.vendor_id,
                received_from: args.received_from,
                received_to: args.received_to,
            };
            let (headers, total) = context
                .services
                .receipts
                .list_grns(args.page, args.limit, filter)
                .await
                .context("failed to list goods received notes")?;
            if json {
                print_json(&PaginatedResponse::new(
                    headers, total, args.page, args.limit,
                ))?;
            } else {
                println!(
                    "Goods received notes page {} ({} per page) total {}",
                    args.page, args.limit, total
                );
                for header in &headers {
                    render_grn(header);
                }
            }
            Ok(())
        }
        GrnsCommands::Get(args) => {
            let details = context
                .services
                .receipts
                .get_grn(args.id)
                .await
                .with_context(|| format!("failed to fetch GRN {}", args.id))?;
            if json {
                print_json(&details)?;
            } else {
                render_grn(&details.header);
                for line in &details.lines {
                    println!(
                        "  • product {} x {} @ {} (line total {})",
                        line.product_id, line.quantity_received, line.unit_cost, line.line_total
                    );
                }
            }
            Ok(())
        }
    }
}

fn render_report(title: &str, rows: &[StockLevelView], json: bool) -> Result<()> {
    if json {
        print_json(&rows)?;
    } else if rows.is_empty() {
        println!("{}: no rows", title);
    } else {
        println!("{}: {} row(s)", title, rows.len());
        for view in rows {
            render_stock_level(view);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_stock_level(view: &StockLevelView) {
    println!(
        "- {} [{}] • {} • on hand {} • reserved {} • available {} • reorder at {}",
        view.sku,
        view.location,
        view.product_name,
        view.quantity_on_hand,
        view.quantity_reserved,
        view.available,
        view.reorder_level
    );
}

fn render_movement(movement: &stock_movement::Model) {
    let reference = movement
        .reference_number
        .as_deref()
        .map(|r| format!(" ref {}", r))
        .unwrap_or_default();
    println!(
        "- #{} {} • product {} at {} • qty {} ({} -> {}){}",
        movement.id,
        movement.movement_type,
        movement.product_id,
        movement.location,
        movement.quantity,
        movement.quantity_before,
        movement.quantity_after,
        reference
    );
}

fn render_grn(header: &grn_header::Model) {
    println!(
        "- {} • vendor {} • received {} at {} • status {} • {} item(s) • total {}",
        header.grn_number,
        header.vendor_id,
        header.received_date,
        header.location,
        header.status,
        header.total_items,
        header.total_inc_gst
    );
}

fn parse_positive_u64(raw: &str) -> Result<u64, String> {
    let value: u64 = raw
        .parse()
        .map_err(|_| format!("invalid integer '{raw}'"))?;
    if value == 0 {
        Err("value must be greater than zero".to_string())
    } else {
        Ok(value)
    }
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("invalid datetime '{}', expected RFC3339", raw))
}
