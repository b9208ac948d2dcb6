// Server configuration

#[derive(Clone)]
pub struct ServerConfig {
    pub bundle_name: String,
    pub max_upload_bytes: usize,
    pub version: String,
}
