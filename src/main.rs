use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// Use library instead of local modules
use parole_tracker::scoring::{self, RuleId};
use parole_tracker::{
    BehaviorTrackingService, Config, GateState, InmateRecord, SentenceTimeline, SqliteStore,
};

const USAGE: &str = "\
Usage: parole-tracker <command> [args]

Commands:
  init                                          Create the database schema
  add-inmate <id> <start-date|-> <years> [name] Insert or update an inmate record
  timeline <start-date> <years>                 Compute a sentence timeline
  gate <id> [now]                               Check whether tracking is open
  submit <id> <committee> <signature> <rule=points>... [--at <now>]
                                                Record a monthly behavior batch
  history <id>                                  Show the behavior history
  rules                                         List the behavior rule catalog

Dates are YYYY-MM-DD, timestamps RFC 3339. Configuration comes from
PAROLE_CONFIG (JSON file), PAROLE_DB_PATH and PAROLE_BIND_ADDR.";

fn init_logging() {
    // Logs go to stderr so command output stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match args.first() {
        Some(command) => command.as_str(),
        None => {
            println!("{}", USAGE);
            return Ok(());
        }
    };
    let rest = &args[1..];

    match command {
        "timeline" => run_timeline(rest),
        "rules" => {
            run_rules();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            let config = Config::from_env().context("Failed to load configuration")?;
            let store = SqliteStore::open(&config.database_path).with_context(|| {
                format!("Failed to open database at {:?}", config.database_path)
            })?;
            let service = BehaviorTrackingService::with_policy(store, config.policy);

            match command {
                "init" => {
                    println!("✓ Database ready: {:?}", config.database_path);
                    Ok(())
                }
                "add-inmate" => run_add_inmate(&service, rest),
                "gate" => run_gate(&service, rest),
                "submit" => run_submit(&service, rest),
                "history" => run_history(&service, rest),
                other => bail!("Unknown command: {}\n\n{}", other, USAGE),
            }
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument <{}>\n\n{}", name, USAGE))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date {:?}, expected YYYY-MM-DD", value))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp {:?}, expected RFC 3339", value))
}

fn parse_years(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("Invalid sentence length {:?}", value))
}

fn print_timeline(timeline: &SentenceTimeline) {
    let show = |date: Option<NaiveDate>| {
        date.map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("Sentence length:   {} years", timeline.sentence_length);
    println!("Start date:        {}", show(timeline.start_date));
    println!("Parole date:       {}", show(timeline.parole_date));
    println!("Release date:      {}", show(timeline.release_date));
    println!(
        "Time to parole:    {}",
        timeline.duration_to_parole.as_deref().unwrap_or("-")
    );
    println!(
        "Parole to release: {}",
        timeline.duration_from_parole_to_end.as_deref().unwrap_or("-")
    );
}

fn run_timeline(args: &[String]) -> Result<()> {
    let start = parse_date(arg(args, 0, "start-date")?)?;
    let years = parse_years(arg(args, 1, "years")?)?;

    let timeline = parole_tracker::timeline::compute(Some(start), years)?;
    print_timeline(&timeline);
    Ok(())
}

fn run_rules() {
    println!("{:>3}  {:<22} {}", "ID", "CODE", "DESCRIPTION");
    for rule in scoring::catalog() {
        println!("{:>3}  {:<22} {}", rule.id, rule.code, rule.description);
    }
    println!(
        "\nPoints per rule: {}-{}, maximum score: {}",
        scoring::MIN_POINTS,
        scoring::MAX_POINTS,
        scoring::MAX_POSSIBLE_SCORE
    );
}

fn run_add_inmate(service: &BehaviorTrackingService<SqliteStore>, args: &[String]) -> Result<()> {
    let inmate_id = arg(args, 0, "id")?;
    let start_date = match arg(args, 1, "start-date")? {
        "-" => None,
        value => Some(parse_date(value)?),
    };
    let years = parse_years(arg(args, 2, "years")?)?;

    // Validate before writing
    let timeline = service.compute_timeline(start_date, years)?;

    let mut record = InmateRecord::new(inmate_id, start_date, years);
    if args.len() > 3 {
        record.full_name = Some(args[3..].join(" "));
    }
    service.store().upsert_inmate(&record)?;

    println!("✓ Inmate {} saved", inmate_id);
    print_timeline(&timeline);
    Ok(())
}

fn run_gate(service: &BehaviorTrackingService<SqliteStore>, args: &[String]) -> Result<()> {
    let inmate_id = arg(args, 0, "id")?;
    let now = match args.get(1) {
        Some(value) => parse_timestamp(value)?,
        None => Utc::now(),
    };

    let state = service.evaluate_gate(inmate_id, now)?;
    match &state {
        GateState::Open => println!("✓ Open: {}", state.detail()),
        _ => println!("✗ Closed: {}", state.detail()),
    }
    Ok(())
}

fn parse_selection(value: &str) -> Result<(RuleId, i64)> {
    let (rule, points) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid selection {:?}, expected <rule>=<points>", value))?;

    let rule_id = rule
        .trim()
        .parse::<RuleId>()
        .with_context(|| format!("Invalid rule id {:?}", rule))?;
    let points = points
        .trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid points {:?}", points))?;

    Ok((rule_id, points))
}

fn run_submit(service: &BehaviorTrackingService<SqliteStore>, args: &[String]) -> Result<()> {
    let inmate_id = arg(args, 0, "id")?;
    let committee = arg(args, 1, "committee")?;
    let signature = arg(args, 2, "signature")?;

    let mut now = Utc::now();
    let mut selections = BTreeMap::new();
    let mut rest = args[3..].iter();
    while let Some(value) = rest.next() {
        if value == "--at" {
            let at = rest
                .next()
                .ok_or_else(|| anyhow!("--at needs a timestamp"))?;
            now = parse_timestamp(at)?;
        } else {
            let (rule_id, points) = parse_selection(value)?;
            selections.insert(rule_id, points);
        }
    }

    let result = service.submit(inmate_id, &selections, committee, signature, now)?;

    println!("✓ Batch {} recorded", result.batch_id);
    println!("Score:             {}/{}", result.score, result.max_score);
    println!("Time served:       {:.1}%", result.elapsed_fraction * 100.0);
    println!("Eligible:          {}", if result.eligible { "yes" } else { "no" });
    println!("Months tracked:    {}", result.tracked_months);
    print_timeline(&result.timeline);
    Ok(())
}

fn run_history(service: &BehaviorTrackingService<SqliteStore>, args: &[String]) -> Result<()> {
    let inmate_id = arg(args, 0, "id")?;
    let record = service.parole_record(inmate_id)?;

    if record.is_empty() {
        println!("No behavior batches recorded for {}", inmate_id);
        return Ok(());
    }

    for batch in &record.batches {
        let (year, month) = batch.period();
        println!(
            "{}-{:02}  score {:>3}  {} ({})  batch {}",
            year,
            month,
            scoring::score(&batch.entries),
            batch.committee_name,
            batch.signature_ref,
            batch.batch_id
        );
    }
    println!("\nMonths tracked: {}", record.tracked_months());
    Ok(())
}
