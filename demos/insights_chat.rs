use dotenv::dotenv;
use finops_dashboard::{Dashboard, DashboardConfig, InsightsEndpoint, QueryAdmission, RestRecordStore};
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let config = DashboardConfig::from_env()?;
    let store = Arc::new(RestRecordStore::from_config(&config)?);
    let backend = Arc::new(InsightsEndpoint::from_config(&config)?);
    let dashboard = Dashboard::new(store, backend, config)?;

    println!("📊 Loading dashboard data...\n");
    dashboard.refresh().await;

    let snapshot = dashboard.snapshot().await;
    if let Some(err) = &snapshot.connection_error {
        eprintln!("⚠️  {}", err);
    }
    println!(
        "✅ {} financial and {} process rows in view.",
        snapshot.filtered.financial.len(),
        snapshot.filtered.process.len()
    );
    println!(
        "   Avg close: {:.1} days | Automation: {:.1}% | Error rate: {:.2}%\n",
        snapshot.kpis.avg_close_days, snapshot.kpis.avg_automation_rate, snapshot.kpis.avg_error_rate
    );

    println!("Generating insights...");
    dashboard.generate_insights().await;
    let snapshot = dashboard.snapshot().await;
    for (label, text) in [
        ("Close performance", &snapshot.insights.close_performance),
        ("Automation", &snapshot.insights.automation),
        ("Anomalies", &snapshot.insights.anomaly),
    ] {
        if let Some(text) = text {
            println!("\n## {}\n{}", label, text);
        }
    }
    for rec in &snapshot.recommendations {
        println!("\n[{:?}] {}\n  {}\n  {}", rec.priority, rec.title, rec.description, rec.details);
    }

    println!("\n🤖 Ask about your metrics (type 'export' to write a CSV, 'quit' to exit).");
    println!("------------------------------------------------------------------");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let prompt = input.trim();

        if prompt.eq_ignore_ascii_case("quit") || prompt.eq_ignore_ascii_case("exit") {
            break;
        }

        if prompt.eq_ignore_ascii_case("export") {
            match dashboard.export(&std::env::current_dir()?).await {
                Ok(path) => println!("💾 Wrote {}", path.display()),
                Err(e) => eprintln!("❌ Error: {}", e),
            }
            continue;
        }

        if prompt.is_empty() {
            continue;
        }

        println!("\nThinking...");

        let admission = dashboard.send_query(prompt).await;
        let snapshot = dashboard.snapshot().await;
        match admission {
            QueryAdmission::RateLimited => {
                if let Some(notice) = &snapshot.notice {
                    eprintln!("⏳ {}", notice);
                }
            }
            QueryAdmission::Ignored => {}
            QueryAdmission::TooShort | QueryAdmission::Accepted => {
                if let Some(reply) = snapshot.transcript.last() {
                    println!("\n{}\n", reply.content);
                    println!("------------------------------------------------------------------");
                }
            }
        }
    }

    dashboard.shutdown();
    Ok(())
}
