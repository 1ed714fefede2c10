//! CLI binary for pricing checkouts and managing coupons.

use std::io::{self, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use course_checkout::catalog::{BlockingCouponCatalog, FileCouponCatalog};
use course_checkout::checkout::{ChargeCalculatorBlocking, CheckoutOutcome};
use course_checkout::config::CheckoutConfig;
use course_checkout::error::CheckoutError;
use course_checkout::models::{
    CartId, ChargeRequest, ChargeResult, CountryCode, Coupon, CouponCode, CouponKind, Currency,
    Money, PurchaseKind, RegionCode,
};
use course_checkout::notify::TracingNotifier;
use course_checkout::region::{GeoTable, RegionResolution, RegionResolver, RegionTable};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use secrecy::ExposeSecret as _;

/// Cart identifier used for quotes, which never reach the processor.
const QUOTE_CART: &str = "quote";

/// Course checkout CLI: regional pricing, coupons and payment intents.
#[derive(Debug, Parser)]
#[command(name = "checkout", version, about)]
struct Cli {
    /// Override the coupon catalog directory (default: XDG data dir).
    #[arg(long, global = true, value_name = "DIR")]
    coupon_dir: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a client address (or X-Forwarded-For value) to a region.
    Region {
        /// IPv4 or IPv6 address.
        address: String,
    },
    /// Price a checkout without contacting the payment processor.
    Quote(PriceArgs),
    /// Price a checkout, create the payment intent and reconcile it.
    Charge(ChargeArgs),
    /// Manage the coupon catalog.
    #[command(subcommand)]
    Coupons(CouponCommand),
}

/// Pricing inputs shared by `quote` and `charge`.
#[derive(Debug, Args)]
struct PriceArgs {
    /// Pricing region (AU, US, GB, EU, CA, NZ).
    #[arg(long, value_parser = parse_region)]
    region: RegionCode,
    /// Coupon code as the customer would type it.
    #[arg(long)]
    coupon: Option<String>,
    /// Base price override in minor units of the region's currency.
    #[arg(long, value_name = "MINOR_UNITS")]
    amount: Option<u64>,
}

/// Arguments for the `charge` subcommand.
#[derive(Debug, Args)]
struct ChargeArgs {
    /// Pricing inputs.
    #[command(flatten)]
    price: PriceArgs,
    /// Cart or session identifier (seeds the idempotency key).
    #[arg(long)]
    cart: String,
    /// Customer email for the purchase notification.
    #[arg(long)]
    email: Option<String>,
    /// Charge as the first payment of a subscription.
    #[arg(long)]
    subscription: bool,
}

/// Coupon catalog subcommands.
#[derive(Debug, Subcommand)]
enum CouponCommand {
    /// List every coupon.
    List,
    /// Add or replace a coupon.
    Add(AddCouponArgs),
    /// Remove a coupon.
    Remove {
        /// Coupon code (case-insensitive).
        code: String,
    },
}

/// Arguments for `coupons add`.
#[derive(Debug, Args)]
struct AddCouponArgs {
    /// Coupon code (stored uppercase).
    #[arg(long)]
    code: String,
    /// Percentage off, 1 to 100.
    #[arg(long, conflicts_with = "amount_off", required_unless_present = "amount_off")]
    percent_off: Option<u8>,
    /// Fixed amount off, in minor units.
    #[arg(long)]
    amount_off: Option<u64>,
    /// Restrict the coupon to one currency.
    #[arg(long, value_parser = parse_currency)]
    currency: Option<Currency>,
    /// Store the coupon as inactive.
    #[arg(long)]
    inactive: bool,
}

/// Parses a region code for clap.
fn parse_region(raw: &str) -> Result<RegionCode, String> {
    raw.parse().map_err(|err: CheckoutError| err.to_string())
}

/// Parses a currency code for clap.
fn parse_currency(raw: &str) -> Result<Currency, String> {
    raw.parse().map_err(|err: CheckoutError| err.to_string())
}

/// Prints an error line to stderr.
fn report(context: &str, err: &CheckoutError) -> io::Result<()> {
    writeln!(
        io::stderr().lock(),
        "{} {context}: {err}",
        "error:".red().bold()
    )
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match CheckoutConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            report("invalid configuration", &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let catalog = match create_catalog(cli.coupon_dir.or_else(|| config.coupon_dir.clone())) {
        Ok(catalog) => catalog,
        Err(err) => {
            report("failed to open coupon catalog", &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let calculator = match build_calculator(&config, catalog) {
        Ok(calculator) => calculator,
        Err(err) => {
            report("failed to build calculator", &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    dispatch(&calculator, &config, cli.command)
}

/// Opens the file catalog in `dir`, or in the default XDG data directory.
fn create_catalog(dir: Option<PathBuf>) -> course_checkout::error::Result<FileCouponCatalog> {
    let root = match dir {
        Some(path) => path,
        None => FileCouponCatalog::default_dir()?,
    };
    FileCouponCatalog::new(root)
}

/// Builds the calculator from configuration. Without an API key only
/// quoting works.
fn build_calculator<C: BlockingCouponCatalog>(
    config: &CheckoutConfig,
    catalog: C,
) -> course_checkout::error::Result<ChargeCalculatorBlocking<C>> {
    let regions = RegionTable::default().with_default(config.default_region)?;
    let mut builder = ChargeCalculatorBlocking::builder()
        .catalog(catalog)
        .regions(regions)
        .timeout(config.timeout)
        .retry_policy(config.retry_policy)
        .notifier(TracingNotifier);
    if let Some(key) = config.api_key.as_ref() {
        builder = builder.api_key(key.expose_secret());
    }
    if let Some(url) = config.processor_url.as_deref() {
        builder = builder.base_url(url);
    }
    if let Some(minimum) = config.minimum_charge {
        builder = builder.minimum_charge(minimum);
    }
    builder.build()
}

/// Dispatches to the appropriate subcommand handler.
fn dispatch<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
    config: &CheckoutConfig,
    command: Command,
) -> io::Result<ExitCode> {
    match command {
        Command::Region { address } => cmd_region(calculator, config, &address),
        Command::Quote(args) => cmd_quote(calculator, &args),
        Command::Charge(args) => cmd_charge(calculator, &args),
        Command::Coupons(CouponCommand::List) => cmd_coupons_list(calculator),
        Command::Coupons(CouponCommand::Add(args)) => cmd_coupons_add(calculator, &args),
        Command::Coupons(CouponCommand::Remove { code }) => cmd_coupons_remove(calculator, &code),
    }
}

/// Builds a charge request for `cart` from pricing arguments.
fn build_request(regions: &RegionTable, cart: &str, args: &PriceArgs) -> ChargeRequest {
    let mut request = ChargeRequest::new(CartId::from(cart), args.region);
    if let Some(code) = args.coupon.as_deref() {
        request = request.coupon(code);
    }
    if let Some(amount) = args.amount {
        let currency = regions
            .get(args.region)
            .unwrap_or_else(|| regions.default_price())
            .currency();
        request = request.base_amount(Money::new(amount, currency));
    }
    request
}

/// Executes the `region` subcommand.
fn cmd_region<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
    config: &CheckoutConfig,
    address: &str,
) -> io::Result<ExitCode> {
    let geo = match config.geo_table.as_deref() {
        Some(path) => match GeoTable::from_path(path) {
            Ok(table) => table,
            Err(err) => {
                report("failed to load geo table", &err)?;
                return Ok(ExitCode::FAILURE);
            }
        },
        None => GeoTable::empty(),
    };
    let resolver = RegionResolver::new(geo, calculator.regions().clone());
    print_resolution(address, &resolver.resolve(address))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `quote` subcommand.
fn cmd_quote<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
    args: &PriceArgs,
) -> io::Result<ExitCode> {
    let request = build_request(calculator.regions(), QUOTE_CART, args);
    match calculator.quote(&request) {
        Ok(charge) => {
            print_charge("Quote", &charge)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report("quote failed", &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Executes the `charge` subcommand.
fn cmd_charge<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
    args: &ChargeArgs,
) -> io::Result<ExitCode> {
    let mut request = build_request(calculator.regions(), &args.cart, &args.price);
    if let Some(email) = args.email.as_deref() {
        request = request.customer_email(email);
    }
    if args.subscription {
        request = request.kind(PurchaseKind::Subscription);
    }

    let spinner = make_spinner("Creating payment intent...");
    match calculator.compute_charge(&request) {
        Ok(outcome) => {
            spinner.finish_and_clear();
            print_outcome(&outcome)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            spinner.finish_and_clear();
            report("charge failed", &err)?;
            writeln!(
                io::stderr().lock(),
                "  {} customer would see: {}",
                "hint:".cyan(),
                err.user_message()
            )?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Executes `coupons list`.
fn cmd_coupons_list<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
) -> io::Result<ExitCode> {
    match calculator.catalog().coupons() {
        Ok(coupons) => {
            print_coupons_table(&coupons)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report("failed to read coupons", &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Builds a coupon from `coupons add` arguments.
fn coupon_from_args(args: &AddCouponArgs) -> course_checkout::error::Result<Coupon> {
    let kind = match (args.percent_off, args.amount_off) {
        (Some(percent), None) => CouponKind::PercentOff(percent),
        (None, Some(amount)) => CouponKind::AmountOff(amount),
        (Some(_), Some(_)) | (None, None) => {
            return Err(CheckoutError::InvalidAmount(
                "pass exactly one of --percent-off or --amount-off".to_owned(),
            ));
        }
    };
    let mut coupon = Coupon::new(&args.code, kind)?;
    if let Some(currency) = args.currency {
        coupon = coupon.restricted_to(currency);
    }
    if args.inactive {
        coupon = coupon.deactivated();
    }
    Ok(coupon)
}

/// Executes `coupons add`.
fn cmd_coupons_add<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
    args: &AddCouponArgs,
) -> io::Result<ExitCode> {
    let coupon = match coupon_from_args(args) {
        Ok(coupon) => coupon,
        Err(err) => {
            report("invalid coupon", &err)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    let code = coupon.code.clone();
    match calculator.catalog().upsert_coupons(vec![coupon]) {
        Ok(()) => {
            writeln!(io::stdout().lock(), "{} {code}", "Saved coupon".green().bold())?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report("failed to save coupon", &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Executes `coupons remove`.
fn cmd_coupons_remove<C: BlockingCouponCatalog>(
    calculator: &ChargeCalculatorBlocking<C>,
    raw: &str,
) -> io::Result<ExitCode> {
    let Some(code) = CouponCode::parse(raw) else {
        writeln!(
            io::stderr().lock(),
            "{} coupon code must not be blank",
            "error:".red().bold()
        )?;
        return Ok(ExitCode::FAILURE);
    };
    match calculator.catalog().remove_coupons(&[code.clone()]) {
        Ok(()) => {
            writeln!(io::stdout().lock(), "{} {code}", "Removed coupon".green().bold())?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            report("failed to remove coupon", &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

// ── Output formatting ────────────────────────────────────────────────

/// Human-readable discount rule.
fn format_discount(coupon: &Coupon) -> String {
    match coupon.kind {
        CouponKind::PercentOff(percent) => format!("{percent}%"),
        CouponKind::AmountOff(amount) => coupon.currency.map_or_else(
            || format!("{amount} minor units"),
            |currency| Money::new(amount, currency).display_with_symbol(),
        ),
    }
}

/// Prints a resolved region.
fn print_resolution(address: &str, resolution: &RegionResolution) -> io::Result<()> {
    let mut out = io::stdout().lock();
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Region").fg(Color::Cyan),
        Cell::new("Price").fg(Color::Cyan),
        Cell::new("Source").fg(Color::Cyan),
        Cell::new("Country").fg(Color::Cyan),
    ]);
    let country = resolution
        .country
        .as_ref()
        .map_or("\u{2014}", CountryCode::as_str);
    _ = table.add_row(vec![
        Cell::new(resolution.region_code()),
        Cell::new(resolution.base_amount().display_with_symbol()),
        Cell::new(format!("{:?}", resolution.source)),
        Cell::new(country),
    ]);

    writeln!(out, "{} {}", "Region for".green().bold(), address.bold())?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    if resolution.lookup_failed {
        writeln!(
            out,
            "{} geolocation failed, default region used",
            "warning:".yellow().bold()
        )?;
    }
    Ok(())
}

/// Prints a priced charge.
fn print_charge(title: &str, charge: &ChargeResult) -> io::Result<()> {
    let mut out = io::stdout().lock();
    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Region").fg(Color::Cyan),
        Cell::new("Original").fg(Color::Cyan),
        Cell::new("Discount").fg(Color::Cyan),
        Cell::new("Final").fg(Color::Cyan),
        Cell::new("Coupon").fg(Color::Cyan),
    ]);
    let coupon = charge
        .coupon_applied
        .as_ref()
        .map_or_else(|| "\u{2014}".to_owned(), |applied| {
            format!("{} ({})", applied.code, format_discount(applied))
        });
    let final_cell = if charge.floor_clamped {
        Cell::new(format!("{} *", charge.final_amount.display_with_symbol())).fg(Color::Yellow)
    } else {
        Cell::new(charge.final_amount.display_with_symbol()).fg(Color::Green)
    };
    _ = table.add_row(vec![
        Cell::new(charge.region),
        Cell::new(charge.original_amount.display_with_symbol()),
        Cell::new(charge.discount_amount.display_with_symbol()),
        final_cell,
        Cell::new(coupon),
    ]);

    writeln!(out, "{}", title.green().bold())?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    if charge.floor_clamped {
        writeln!(
            out,
            "{}",
            "* raised to the payment processor's minimum charge".dimmed()
        )?;
    }
    Ok(())
}

/// Prints a completed checkout.
fn print_outcome(outcome: &CheckoutOutcome) -> io::Result<()> {
    print_charge("Payment intent created", &outcome.charge)?;
    let mut out = io::stdout().lock();
    writeln!(out, "  {} {}", "Intent:".bold(), outcome.intent_id)?;
    writeln!(
        out,
        "  {} {}",
        "Trail:".bold(),
        format!("{} steps, reconciled", outcome.trail.len()).dimmed()
    )?;
    Ok(())
}

/// Prints coupons in a table.
fn print_coupons_table(coupons: &[Coupon]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if coupons.is_empty() {
        writeln!(out, "{}", "No coupons found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Code").fg(Color::Cyan),
        Cell::new("Discount").fg(Color::Cyan),
        Cell::new("Currency").fg(Color::Cyan),
        Cell::new("Expires").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);

    for coupon in coupons {
        let currency = coupon
            .currency
            .map_or_else(|| "any".to_owned(), |only| only.to_string());
        let expires = coupon
            .expires_at
            .map_or_else(|| "\u{2014}".to_owned(), |at| at.format("%Y-%m-%d %H:%M").to_string());
        let status = if coupon.active {
            Cell::new("active").fg(Color::Green)
        } else {
            Cell::new("inactive").fg(Color::DarkGrey)
        };
        _ = table.add_row(vec![
            Cell::new(&coupon.code),
            Cell::new(format_discount(coupon)),
            Cell::new(currency),
            Cell::new(expires),
            status,
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Coupons".green().bold(),
        format!("({})", coupons.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Creates a spinner with the given message.
fn make_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_owned());
    spinner.enable_steady_tick(core::time::Duration::from_millis(80));
    spinner
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
