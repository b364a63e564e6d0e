use anyhow::{Context, Result};
use futures::future::join_all;
use std::io::Write;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wayfarer::{
    auth,
    config::Config,
    jobs::{CityMetaJobs, ItineraryJobs},
    navigation::ConsoleNavigator,
    types::{CityMeta, ItineraryRequest, ItineraryRequestRecord, JobHandle},
    ApiClient, ClientError, Poller, SessionManager,
};

const USAGE: &str = "Usage: wayfarer <login <email>|logout|status|renew|dashboard|itinerary <request.json> [--event <id>]|itinerary-status <id>|city <name>...>";

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var("WAYFARER_PASSWORD") {
        return Ok(password);
    }

    print!("🔑 Password: ");
    std::io::stdout().flush()?;
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

fn render_itinerary(record: ItineraryRequestRecord) {
    println!("\n🗺️  Itinerary for {}", record.city);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Status: {}", String::from(record.status));
    if let (Some(start), Some(end)) = (record.start_date, record.end_date) {
        println!("   Dates:  {} → {}", start, end);
    }
    for (day, detail) in record.details.iter().enumerate() {
        println!("   Day {}: {}", day + 1, detail);
    }
    println!();
}

fn render_city(meta: CityMeta) {
    println!("\n🏙️  {}, {}", meta.name, meta.country);
    println!(
        "   📍 {:.4}, {:.4}",
        meta.coordinates.lat, meta.coordinates.lng
    );
    println!("   {}\n", meta.description);
}

/// Turn a failed outcome into a visible message; session-ending errors have already navigated
fn report(err: ClientError) -> Result<()> {
    if err.requires_login() {
        eprintln!("🔒 Session ended, please log in again");
    } else {
        eprintln!("❌ {}", err.user_message());
        tracing::debug!(err = %err, "command failed");
    }
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let config = Config::load()?;
    init_logging(&config);
    info!("wayfarer v{} → {}{}", wayfarer::VERSION, config.api.base_url, config.api.prefix);

    let api = ApiClient::from_config(&config.api)?;
    let store = auth::open_store(&config.session);
    let session = SessionManager::new(
        Arc::new(api.clone()),
        store,
        Arc::new(ConsoleNavigator),
        &config.session,
    );
    let poller = Poller::new(config.polling.policy());

    let outcome = match args[1].as_str() {
        "login" => {
            let Some(email) = args.get(2) else {
                eprintln!("Usage: wayfarer login <email>");
                std::process::exit(1);
            };
            let password = read_password()?;
            session.login(email, &password).await.map(|landing| {
                println!("✅ Logged in, landing on {}", landing);
            })
        }

        "logout" => {
            session.logout().await;
            println!("✅ Session cleared");
            Ok(())
        }

        "status" => {
            println!("\n🔐 Session Status");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
            match session.credentials() {
                Some(record) => {
                    let issued = chrono::DateTime::from_timestamp(record.issued_at, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| record.issued_at.to_string());
                    let due = record.issued_at + config.session.renew_after_secs as i64
                        - chrono::Utc::now().timestamp();
                    println!("✅ Authenticated (tokens issued {})", issued);
                    if due > 0 {
                        println!("   Renewal due in {} seconds", due);
                    } else {
                        println!("   ⚠️  Renewal overdue - run `wayfarer renew`");
                    }
                }
                None => println!("❌ Not authenticated"),
            }
            println!();
            Ok(())
        }

        "renew" => session.resume().await.map(|resumed| {
            if resumed {
                println!("✅ Session renewed");
            } else {
                println!("❌ No stored session");
            }
        }),

        "dashboard" => session.enter_dashboard().await.map(|_| ()),

        "itinerary" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: wayfarer itinerary <request.json> [--event <id>]");
                std::process::exit(1);
            };
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read itinerary request: {}", path))?;
            let request: ItineraryRequest = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse itinerary request: {}", path))?;

            let jobs = match args.iter().position(|a| a == "--event") {
                Some(i) => {
                    let event_id = args
                        .get(i + 1)
                        .context("--event requires an event id")?;
                    ItineraryJobs::for_event(api.clone(), Arc::clone(&session), event_id.clone())
                }
                None => ItineraryJobs::new(api.clone(), Arc::clone(&session)),
            };

            println!("⏳ Generating itinerary for {}...", request.city);
            poller
                .submit_and_run(&jobs, &request, render_itinerary)
                .await
                .map(|handle| info!(%handle, "itinerary ready"))
        }

        "itinerary-status" => {
            let Some(id) = args.get(2) else {
                eprintln!("Usage: wayfarer itinerary-status <id>");
                std::process::exit(1);
            };
            let jobs = ItineraryJobs::new(api.clone(), Arc::clone(&session));
            println!("⏳ Waiting for itinerary {}...", id);
            poller
                .run(&jobs, &JobHandle::new(id.clone()), render_itinerary)
                .await
        }

        "city" => {
            if args.len() < 3 {
                eprintln!("Usage: wayfarer city <name>...");
                std::process::exit(1);
            }
            let jobs = Arc::new(CityMetaJobs::new(api.clone()));
            let mut loops = Vec::new();
            for name in &args[2..] {
                let handle = match wayfarer::JobSource::submit(jobs.as_ref(), name.as_str()).await {
                    Ok(handle) => handle,
                    Err(e) => return report(e),
                };
                loops.push(poller.spawn(Arc::clone(&jobs), handle, render_city));
            }

            let mut outcome = Ok(());
            for result in join_all(loops).await {
                match result.context("city lookup task failed")? {
                    Ok(()) => {}
                    Err(e) => outcome = Err(e),
                }
            }
            outcome
        }

        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => report(e),
    }
}
