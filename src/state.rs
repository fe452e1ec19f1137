use crate::config::settings::AppConfig;
use crate::infrastructure::storage::artifact_store::ArtifactStore;
use crate::workers::transcoder::Transcoder;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: ArtifactStore,
    pub transcoder: Transcoder,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = ArtifactStore::new(config.artifact_dir.clone(), config.artifact_ttl());
        let transcoder = Transcoder::new(&config.transcoder, config.process_timeout());

        Self {
            config,
            store,
            transcoder,
        }
    }
}
