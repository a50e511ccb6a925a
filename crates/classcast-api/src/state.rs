use std::sync::Arc;

use classcast_db::Database;
use classcast_gateway::dispatcher::Dispatcher;

use crate::directory::Directory;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub directory: Directory,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}
