use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth;
use crate::auth::service::JwtAuthService;
use crate::event::hub::Hub;
use crate::integration;
use crate::message;
use crate::message::repository::MongoMessageRepository;
use crate::message::service::MessageService;
use crate::presence::service::PresenceService;
use crate::presence::store::PresenceStore;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub auth_service: auth::Service,
    pub presence_service: PresenceService,
    pub message_service: MessageService,
}

impl AppState {
    pub async fn init(config: &integration::Config) -> crate::Result<Self> {
        let database = integration::db::init(&config.mongo).await?;

        let hub = Arc::new(Hub::new());
        let presence_service =
            PresenceService::new(Arc::new(PresenceStore::new()), hub.clone());

        let repository: message::Repository =
            Arc::new(MongoMessageRepository::new(&database));
        let message_service =
            MessageService::new(repository, hub.clone(), presence_service.clone());

        Ok(Self {
            hub,
            auth_service: Arc::new(JwtAuthService::new(&config.idp)),
            presence_service,
            message_service,
        })
    }
}

impl FromRef<AppState> for Arc<Hub> {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

impl FromRef<AppState> for auth::Service {
    fn from_ref(state: &AppState) -> Self {
        state.auth_service.clone()
    }
}

impl FromRef<AppState> for PresenceService {
    fn from_ref(state: &AppState) -> Self {
        state.presence_service.clone()
    }
}

impl FromRef<AppState> for MessageService {
    fn from_ref(state: &AppState) -> Self {
        state.message_service.clone()
    }
}
