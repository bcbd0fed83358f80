use crm_metrics::{
    api::{DashboardApi, Session},
    config::{crm::load_crm_config, metrics::load_default_config},
    core::report::render_dashboard,
    errors::{Error, Result},
    gateway::{CrmGateway, http::HttpCrmGateway},
};
use dotenvy::dotenv;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // 2. Load .env file; variables may also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load configuration
    let crm_config = load_crm_config()
        .inspect_err(|e| error!("Failed to load CRM configuration: {}", e))?;
    let metrics_config = load_default_config()
        .inspect(|_| info!("Metrics configuration loaded."))
        .inspect_err(|e| error!("Failed to load metrics configuration: {}", e))?;

    // 4. Build the gateway and the API
    let gateway: Arc<dyn CrmGateway> = Arc::new(
        HttpCrmGateway::new(&crm_config)
            .inspect(|_| info!("CRM gateway ready at {}", crm_config.base_url))?,
    );
    let api = DashboardApi::new(gateway, metrics_config);

    // 5. The binary runs as the operator named in DASHBOARD_USER_EMAIL
    let session = env::var("DASHBOARD_USER_EMAIL")
        .map(Session::authenticated)
        .inspect_err(|_| error!("DASHBOARD_USER_EMAIL is not set"))
        .map_err(Error::EnvVar)?;

    // 6. One dashboard run
    let metrics = api
        .get_dashboard_metrics(&session)
        .await
        .inspect_err(|e| error!("Dashboard aggregation failed: {}", e))?;
    let insights = api.analyze_campaign_effectiveness(&session).await?;
    let recommendations = api.get_recommendations(&session, &metrics)?;

    let json_output = env::var("DASHBOARD_OUTPUT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_output {
        let body = serde_json::json!({
            "metrics": metrics,
            "campaigns": insights,
            "recommendations": recommendations,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", render_dashboard(&metrics, &insights, &recommendations));
    }

    Ok(())
}
