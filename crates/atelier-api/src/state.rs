use std::sync::Arc;

use atelier_db::Database;
use atelier_gateway::dispatcher::Dispatcher;
use atelier_gateway::notify::Notifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub notifier: Notifier,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, jwt_secret: String) -> AppState {
        let notifier = Notifier::new(db.clone(), dispatcher.clone());
        Arc::new(Self {
            db,
            dispatcher,
            notifier,
            jwt_secret,
        })
    }
}
