use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use salonpulse::query::period::parse_timestamp;
use salonpulse::{
    AppointmentOrder, AppointmentQuery, CustomerMetrics, Granularity, NewBooking, NewCustomer,
    NewService, NewTechnician, Period, SalonPulse, Segment,
};

#[derive(Parser)]
#[command(name = "salonpulse", about = "Salon customer lifetime value and staff analytics")]
struct Cli {
    /// Database path (default: ~/.salonpulse/salonpulse.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Window selection shared by the windowed reports.
#[derive(clap::Args, Clone, Default)]
struct WindowArgs {
    /// Period (e.g. 30d, 2025, 2025-Q1, 2025-03, 2025-W05, ytd, qtd, mtd)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    period: Option<String>,
    /// Window start (YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS])
    #[arg(long)]
    start: Option<String>,
    /// Window end (YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS])
    #[arg(long)]
    end: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record technicians, services, customers and appointments
    Add {
        #[command(subcommand)]
        target: AddTarget,
    },
    /// List appointment history with filters
    Appointments {
        /// Filter by technician id
        #[arg(long)]
        technician: Option<i64>,
        /// Filter by customer id
        #[arg(long)]
        customer: Option<i64>,
        /// Filter by customer phone
        #[arg(long)]
        phone: Option<String>,
        /// Filter by service id
        #[arg(long)]
        service: Option<i64>,
        /// Filter by payment method
        #[arg(long)]
        payment: Option<String>,
        #[command(flatten)]
        window: WindowArgs,
        /// Sort by: date, price, tip, total
        #[arg(long, default_value = "date")]
        order: String,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Maximum results
        #[arg(long, default_value = "100")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
        /// Count only (no output rows)
        #[arg(long)]
        count: bool,
    },
    /// Customer lifetime value table, highest spend first
    Customers {
        /// Only customers in this segment (e.g. VIP, At-Risk, "Needs Attention")
        #[arg(long)]
        segment: Option<String>,
        /// Maximum rows
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Customer counts and spend per segment
    Segments {
        #[arg(long)]
        json: bool,
    },
    /// Segment summary, top customers and at-risk list
    Report {
        #[arg(long)]
        json: bool,
    },
    /// Customers who have not been in for a while
    Lapsed {
        /// Days without a visit (default: report.lapsed_days)
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Revenue breakdown by period, technician and service
    Revenue {
        /// Only this technician's appointments
        #[arg(long)]
        technician: Option<i64>,
        #[command(flatten)]
        window: WindowArgs,
        /// Trend bucket: day or month
        #[arg(long, default_value = "day")]
        by: String,
        #[arg(long)]
        json: bool,
    },
    /// Technician performance analytics
    Staff {
        #[command(subcommand)]
        target: StaffTarget,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show ledger status
    Status,
}

#[derive(Subcommand)]
enum AddTarget {
    /// Add a technician
    Technician {
        name: String,
        /// Share of service revenue paid as commission, 0 to 1
        #[arg(long, default_value = "0.6")]
        commission: f64,
    },
    /// Add a menu service
    Service {
        name: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        category: Option<String>,
    },
    /// Add a customer
    Customer {
        name: String,
        phone: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record an appointment; the customer is created on first visit
    Appointment {
        #[arg(long)]
        technician: i64,
        #[arg(long)]
        service: i64,
        /// Customer first name
        #[arg(long)]
        name: String,
        /// Customer phone
        #[arg(long)]
        phone: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "0")]
        tip: f64,
        /// Cash, Card, Venmo, ...
        #[arg(long)]
        payment: Option<String>,
        /// Appointment time (default: now)
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Subcommand)]
enum StaffTarget {
    /// Ranked technician performance
    Performance {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        json: bool,
    },
    /// Daily revenue trend for a technician
    Trend {
        technician: i64,
        /// Trailing days (default: window.trend_days)
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Customer retention per technician
    Retention {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        json: bool,
    },
    /// A technician's most performed services
    TopServices {
        technician: i64,
        /// Maximum rows (default: report.top_services_limit)
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Salon-wide staff totals
    Summary {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List stored values and effective analytics settings
    List,
}

/// Number of customers shown in the report's top list.
const REPORT_TOP_CUSTOMERS: usize = 10;

type Bounds = (Option<NaiveDateTime>, Option<NaiveDateTime>);

impl WindowArgs {
    /// Explicit bounds from `--period` or `--start`/`--end`. Missing bounds
    /// are left for the configured defaults.
    fn bounds(&self) -> anyhow::Result<Bounds> {
        if let Some(ref period) = self.period {
            let window = Period::parse(period)?.window(salonpulse::local_now())?;
            return Ok((Some(window.start()), Some(window.end())));
        }
        let start = self
            .start
            .as_deref()
            .map(|s| parse_timestamp(s, false))
            .transpose()?;
        let end = self
            .end
            .as_deref()
            .map(|s| parse_timestamp(s, true))
            .transpose()?;
        Ok((start, end))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => salonpulse::Database::open_at(path).await?,
        None => salonpulse::Database::open().await?,
    };
    let app = SalonPulse::new(db);

    match cli.command {
        Commands::Status => {
            print_status(&app).await?;
        }
        Commands::Config { action } => {
            handle_config(&app, action).await?;
        }
        Commands::Add { target } => {
            handle_add(&app, target).await?;
        }
        Commands::Appointments {
            technician,
            customer,
            phone,
            service,
            payment,
            window,
            order,
            desc,
            limit,
            json,
            csv,
            count,
        } => {
            let mut builder = AppointmentQuery::new()
                .order_by(order.parse::<AppointmentOrder>()?)
                .limit(limit);
            if desc {
                builder = builder.descending();
            }
            if let Some(id) = technician {
                builder = builder.technician(id);
            }
            if let Some(id) = customer {
                builder = builder.customer(id);
            }
            if let Some(ref p) = phone {
                builder = builder.customer_phone(p);
            }
            if let Some(id) = service {
                builder = builder.service(id);
            }
            if let Some(ref m) = payment {
                builder = builder.payment_method(m);
            }
            let (start, end) = window.bounds()?;
            if let Some(t) = start {
                builder = builder.after(t);
            }
            if let Some(t) = end {
                builder = builder.before(t);
            }
            handle_appointments(&app, builder, json, csv, count).await?;
        }
        Commands::Customers {
            segment,
            limit,
            json,
        } => {
            let segment = segment.as_deref().map(str::parse::<Segment>).transpose()?;
            let mut customers = app.calculate_customer_ltv(None).await?;
            if let Some(segment) = segment {
                customers.retain(|c| c.segment == segment);
            }
            if let Some(n) = limit {
                customers.truncate(n);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&customers)?);
            } else {
                print_customer_table(&customers);
            }
        }
        Commands::Segments { json } => {
            let summary = app.segment_summary(None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_segment_summary(&summary);
            }
        }
        Commands::Report { json } => {
            handle_report(&app, json).await?;
        }
        Commands::Lapsed { days, json } => {
            let lapsed = app.lapsed_customers(days, None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&lapsed)?);
            } else if lapsed.is_empty() {
                println!("No lapsed customers.");
            } else {
                for c in &lapsed {
                    println!(
                        "{} ({}) - last visit {} ({} days ago)",
                        c.name,
                        c.phone,
                        c.last_visit.format("%Y-%m-%d"),
                        c.days_missed
                    );
                }
                println!("\n{} customers", lapsed.len());
            }
        }
        Commands::Revenue {
            technician,
            window,
            by,
            json,
        } => {
            let granularity: Granularity = by.parse()?;
            let (start, end) = window.bounds()?;
            let window = match (start, end) {
                (None, None) => None,
                (start, end) => Some(salonpulse::DateWindow::resolve(
                    start,
                    end,
                    app.config().await?.performance_window_days,
                    salonpulse::local_now(),
                )?),
            };
            let breakdown = app.revenue_breakdown(technician, window, granularity).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&breakdown)?);
            } else {
                println!("Revenue by {granularity}:");
                for row in &breakdown.trend {
                    println!("  {:<12} ${:>10.2}", row.label, row.amount);
                }
                println!("\nBy technician:");
                for row in &breakdown.by_technician {
                    println!("  {:<20} ${:>10.2}", row.label, row.amount);
                }
                println!("\nBy service:");
                for row in &breakdown.by_service {
                    println!("  {:<20} ${:>10.2}", row.label, row.amount);
                }
            }
        }
        Commands::Staff { target } => {
            handle_staff(&app, target).await?;
        }
    }

    Ok(())
}

async fn print_status(app: &SalonPulse) -> anyhow::Result<()> {
    let status = app.status().await?;
    let fmt = |t: Option<NaiveDateTime>| {
        t.map_or_else(|| "none".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
    };
    println!("Ledger Status");
    println!("  Customers:    {}", status.customers);
    println!("  Technicians:  {}", status.technicians);
    println!("  Services:     {}", status.services);
    println!("  Appointments: {}", status.appointments);
    println!("  First:        {}", fmt(status.first_appointment));
    println!("  Latest:       {}", fmt(status.last_appointment));
    Ok(())
}

async fn handle_config(app: &SalonPulse, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match app.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            app.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let stored = app.config_list().await?;
            let effective = app.config().await?;
            println!("Analytics settings:");
            for (key, value) in effective.entries() {
                let marker = if stored.iter().any(|(k, _)| k == key) {
                    ""
                } else {
                    " (default)"
                };
                println!("  {key} = {value}{marker}");
            }
            let extra: Vec<_> = stored
                .iter()
                .filter(|(k, _)| !salonpulse::config::KNOWN_KEYS.contains(&k.as_str()))
                .collect();
            if !extra.is_empty() {
                println!("\nOther values:");
                for (k, v) in extra {
                    println!("  {k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn handle_add(app: &SalonPulse, target: AddTarget) -> anyhow::Result<()> {
    match target {
        AddTarget::Technician { name, commission } => {
            let id = app
                .add_technician(NewTechnician {
                    name,
                    commission_rate: commission,
                })
                .await?;
            println!("Added technician {id}");
        }
        AddTarget::Service {
            name,
            price,
            category,
        } => {
            let id = app
                .add_service(NewService {
                    name,
                    base_price: price,
                    category,
                })
                .await?;
            println!("Added service {id}");
        }
        AddTarget::Customer { name, phone, notes } => {
            let id = app
                .add_customer(NewCustomer {
                    first_name: name,
                    phone,
                    notes,
                })
                .await?;
            println!("Added customer {id}");
        }
        AddTarget::Appointment {
            technician,
            service,
            name,
            phone,
            price,
            tip,
            payment,
            at,
        } => {
            let date_time = at.as_deref().map(|s| parse_timestamp(s, false)).transpose()?;
            let id = app
                .add_appointment(NewBooking {
                    technician_id: technician,
                    service_id: service,
                    customer_name: name,
                    customer_phone: phone,
                    price_charged: price,
                    tip_amount: tip,
                    payment_method: payment,
                    date_time,
                })
                .await?;
            println!("Recorded appointment {id}");
        }
    }
    Ok(())
}

async fn handle_appointments(
    app: &SalonPulse,
    builder: AppointmentQuery,
    json: bool,
    csv: bool,
    count: bool,
) -> anyhow::Result<()> {
    let db = app.db();
    if count {
        let n = builder.count(db).await?;
        println!("{n}");
    } else if json {
        let output = builder.to_json(db).await?;
        println!("{output}");
    } else if csv {
        let output = builder.to_csv(db).await?;
        print!("{output}");
    } else {
        let rows = builder.appointments(db).await?;
        if rows.is_empty() {
            println!("No appointments found.");
        } else {
            for row in &rows {
                let payment = row.payment_method.as_deref().unwrap_or("-");
                println!(
                    "{} #{} {} - {} with {} | ${:.2} + ${:.2} tip ({payment})",
                    row.date_time.format("%Y-%m-%d %H:%M"),
                    row.id,
                    row.customer_name,
                    row.service_name,
                    row.technician_name,
                    row.price_charged,
                    row.tip_amount,
                );
            }
            println!("\n{} appointments", rows.len());
        }
    }
    Ok(())
}

async fn handle_report(app: &SalonPulse, json: bool) -> anyhow::Result<()> {
    let customers = app.calculate_customer_ltv(None).await?;
    let summary = salonpulse::metrics::segment_summary(&customers);
    let overview = salonpulse::metrics::customer_overview(&customers);
    let top: Vec<&CustomerMetrics> = customers.iter().take(REPORT_TOP_CUSTOMERS).collect();
    let at_risk: Vec<&CustomerMetrics> = customers
        .iter()
        .filter(|c| c.segment == Segment::AtRisk)
        .collect();

    if json {
        let report = serde_json::json!({
            "overview": overview,
            "segments": summary,
            "top_customers": top,
            "at_risk": at_risk,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Customer Overview");
    println!("  Customers: {}", overview.total_customers);
    println!("  Total LTV: ${:.2}", overview.total_ltv);
    println!("  Avg LTV:   ${:.2}", overview.avg_ltv);
    println!("  VIP:       {}", overview.vip_count);
    println!("  At-Risk:   {}", overview.at_risk_count);
    println!();
    print_segment_summary(&summary);
    println!("\nTop {} customers by lifetime value:", top.len());
    for c in &top {
        println!(
            "  {:<16} {:<14} ${:>9.2}  {} visits  [{}]",
            c.name, c.phone, c.total_spend, c.total_visits, c.segment
        );
    }
    if at_risk.is_empty() {
        println!("\nNo at-risk customers.");
    } else {
        println!("\nAt-risk customers:");
        for c in &at_risk {
            println!(
                "  {:<16} {:<14} last visit {} days ago, ${:.2} lifetime",
                c.name, c.phone, c.days_since_last_visit, c.total_spend
            );
        }
    }
    Ok(())
}

async fn handle_staff(app: &SalonPulse, target: StaffTarget) -> anyhow::Result<()> {
    match target {
        StaffTarget::Performance { window, json } => {
            let (start, end) = window.bounds()?;
            let perf = app.technician_performance(start, end).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&perf)?);
            } else if perf.is_empty() {
                println!("No appointments in this window.");
            } else {
                for p in &perf {
                    println!("#{} {} ({:.0}% commission)", p.rank, p.name, p.commission_rate * 100.0);
                    println!("    Appointments: {}", p.appointment_count);
                    println!("    Revenue:      ${:.2}", p.total_revenue);
                    println!("    Tips:         ${:.2}", p.total_tips);
                    println!("    Commission:   ${:.2}", p.commission_earned);
                    println!("    Avg price:    ${:.2}", p.avg_service_price);
                    println!("    Customers:    {}", p.unique_customers);
                }
            }
        }
        StaffTarget::Trend {
            technician,
            days,
            json,
        } => {
            let trend = app.technician_revenue_trend(technician, days, None).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trend)?);
            } else if trend.dates.is_empty() {
                println!("No revenue in this window.");
            } else {
                for (date, revenue) in trend.dates.iter().zip(&trend.revenues) {
                    println!("  {date}  ${revenue:>9.2}");
                }
            }
        }
        StaffTarget::Retention { window, json } => {
            let (start, end) = window.bounds()?;
            let retention = app.customer_retention_by_technician(start, end).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&retention)?);
            } else {
                for r in &retention {
                    println!(
                        "  {:<16} {:>3}/{:<3} returning  {:>5.1}%",
                        r.technician_name, r.returning_customers, r.total_customers, r.retention_rate
                    );
                }
            }
        }
        StaffTarget::TopServices {
            technician,
            limit,
            json,
        } => {
            let services = app.top_services_by_technician(technician, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&services)?);
            } else if services.is_empty() {
                println!("No services recorded for technician {technician}.");
            } else {
                for s in &services {
                    println!("  {:<20} {:>4}x  ${:>9.2}", s.service_name, s.count, s.revenue);
                }
            }
        }
        StaffTarget::Summary { window, json } => {
            let (start, end) = window.bounds()?;
            let stats = app.staff_summary_stats(start, end).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Staff Summary ({} days)", stats.date_range_days);
                println!("  Technicians:      {}", stats.total_technicians);
                println!("  Appointments:     {}", stats.total_appointments);
                println!("  Revenue:          ${:.2}", stats.total_revenue);
                println!("  Tips:             ${:.2}", stats.total_tips);
                println!("  Revenue per tech: ${:.2}", stats.avg_revenue_per_tech);
            }
        }
    }
    Ok(())
}

fn print_customer_table(customers: &[CustomerMetrics]) {
    if customers.is_empty() {
        println!("No customers found.");
        return;
    }
    for c in customers {
        println!(
            "{:<16} {:<14} {:<16} {:>3} visits  ${:>9.2}  predicted ${:>9.2}  last seen {}d ago",
            c.name,
            c.phone,
            c.segment.label(),
            c.total_visits,
            c.total_spend,
            c.predicted_ltv_12mo,
            c.days_since_last_visit
        );
        println!(
            "    favourites: {} | technician: {} | trend: {:?}",
            c.favorite_services.join(", "),
            c.favorite_technician,
            c.visit_trend
        );
    }
    println!("\n{} customers", customers.len());
}

fn print_segment_summary(summary: &salonpulse::SegmentSummary) {
    if summary.is_empty() {
        println!("No customers with appointments yet.");
        return;
    }
    println!("Segments:");
    for (segment, stats) in summary {
        println!(
            "  {:<16} {:>4} customers  ${:>10.2} total  ${:>8.2} avg",
            segment.label(),
            stats.count,
            stats.total_revenue,
            stats.avg_spend
        );
    }
}
