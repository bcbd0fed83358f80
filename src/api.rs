//! Presentation boundary.
//!
//! Gates every operation on an authenticated session and exposes the
//! dashboard snapshot, campaign insights and recommendations to callers.

use crate::{
    config::MetricsConfig,
    core::{
        campaigns::{CampaignAnalyzer, CampaignInsight},
        dashboard::{DashboardMetrics, MetricsService},
        recommendations::{RecommendationList, generate_recommendations},
    },
    errors::{Error, Result},
    gateway::CrmGateway,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Identity of the caller as seen by the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Whether the caller has logged in
    pub is_authenticated: bool,
    /// Email of the logged-in user, if known
    pub user_email: Option<String>,
}

impl Session {
    /// A session with no logged-in user.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A logged-in session.
    #[must_use]
    pub fn authenticated(email: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            user_email: Some(email.into()),
        }
    }

    fn require(&self) -> Result<()> {
        if self.is_authenticated {
            Ok(())
        } else {
            warn!("Rejected unauthenticated dashboard request");
            Err(Error::Unauthorized)
        }
    }
}

/// Entry point used by the binary and any other front end.
#[derive(Clone)]
pub struct DashboardApi {
    metrics: MetricsService,
    campaigns: CampaignAnalyzer,
}

impl DashboardApi {
    /// Wires the metrics service and campaign analyzer to one gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>, config: MetricsConfig) -> Self {
        let config = Arc::new(config);
        Self {
            metrics: MetricsService::new(Arc::clone(&gateway), Arc::clone(&config)),
            campaigns: CampaignAnalyzer::new(gateway, config),
        }
    }

    /// Current dashboard snapshot.
    ///
    /// # Errors
    /// `Error::Unauthorized` for anonymous sessions, `Error::Aggregation`
    /// when the contact count fails.
    #[instrument(skip(self, session), fields(user = session.user_email.as_deref()))]
    pub async fn get_dashboard_metrics(&self, session: &Session) -> Result<DashboardMetrics> {
        session.require()?;
        self.metrics.get_dashboard_metrics().await
    }

    /// Insights for every campaign, in campaign listing order.
    ///
    /// # Errors
    /// `Error::Unauthorized` for anonymous sessions. CRM failures degrade
    /// instead of erroring.
    #[instrument(skip(self, session), fields(user = session.user_email.as_deref()))]
    pub async fn analyze_campaign_effectiveness(
        &self,
        session: &Session,
    ) -> Result<Vec<CampaignInsight>> {
        session.require()?;
        Ok(self.campaigns.analyze_all().await)
    }

    /// Insight for one campaign, `None` if it does not exist.
    ///
    /// # Errors
    /// `Error::Unauthorized` for anonymous sessions, or the gateway error.
    pub async fn campaign_insight(
        &self,
        session: &Session,
        campaign_id: &str,
    ) -> Result<Option<CampaignInsight>> {
        session.require()?;
        self.campaigns.analyze_campaign(campaign_id).await
    }

    /// Recommendations for a snapshot.
    ///
    /// # Errors
    /// `Error::Unauthorized` for anonymous sessions.
    pub fn get_recommendations(
        &self,
        session: &Session,
        metrics: &DashboardMetrics,
    ) -> Result<RecommendationList> {
        session.require()?;
        let list = generate_recommendations(metrics, &self.metrics.config().recommendations);
        info!("Generated {} recommendations", list.count);
        Ok(list)
    }
}
