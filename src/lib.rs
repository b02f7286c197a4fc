use std::sync::Arc;

pub mod config;
pub mod error;
pub mod fare;
pub mod handlers;
pub mod location;
pub mod map_view;
pub mod middleware;
pub mod payment;
pub mod routes;
pub mod routing;
pub mod tracking;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};

use location::FixRegistry;
use payment::upi::PrefsStore;
use payment::PaymentClient;
use routing::RouteClient;
use tracking::TrackingClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tracking: Arc<TrackingClient>,
    pub payments: Arc<PaymentClient>,
    pub router: Arc<RouteClient>,
    pub fixes: Arc<FixRegistry>,
    pub prefs: Arc<PrefsStore>,
}
