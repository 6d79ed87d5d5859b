use arbor_infrastructure::ConfigService;
use std::path::Path;

pub fn config_service(path: Option<&Path>) -> ConfigService {
    match path {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new(),
    }
}
