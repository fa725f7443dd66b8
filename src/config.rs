// IMPORTANT:
// Keep ALL numeric values centralized here (repo rule: no hardcoded numeric values scattered around).

// NOTE: APP_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const APP_VERSION: &str = "0.3.0";

pub mod http {
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const USER_AGENT: &str = "sd-embeddings-sync/0.3.0";
}

pub mod catalog {
    // The repository list is embedded as JSON in a data-props attribute on
    // the parent of the element with this id.
    pub const MODELS_SELECTOR: &str = "#models";
    pub const DATA_PROPS_ATTR: &str = "data-props";
}

pub mod artifacts {
    pub const HF_HOST: &str = "https://huggingface.co";
    pub const EMBEDDING_REMOTE_NAME: &str = "learned_embeds.bin";
    pub const EMBEDDING_LOCAL_EXT: &str = "bin";
    pub const IMAGE_DIR_NAME: &str = "concept_images";
}

pub mod hashing {
    pub const CHUNK_BYTES: usize = 1024 * 1024;
}

pub mod images {
    // Fixed pause between preview-image probes so we don't hammer the host.
    pub const PROBE_DELAY_MS: u64 = 100;
}

pub mod scanner {
    // Debian clamd defaults: unix socket first, TCP fallback.
    pub const CLAMD_UNIX_SOCKET: &str = "/var/run/clamav/clamd.ctl";
    pub const CLAMD_TCP_ADDR: &str = "127.0.0.1:3310";

    pub const INSTREAM_CHUNK_BYTES: usize = 64 * 1024;
    pub const IO_TIMEOUT_SECS: u64 = 30;
}

pub mod settings {
    pub const DEFAULT_SETTINGS_FILE: &str = "./embeddings-config.json";
    pub const DEFAULT_LIBRARY_URL: &str = "https://huggingface.co/sd-concepts-library";
    pub const DEFAULT_EMBEDDINGS_DIR: &str = "./embeddings/";
    pub const DEFAULT_SAMPLES_DIR: &str = "./embeddings_samples/";
    pub const DEFAULT_MAX_IMAGES: u32 = 4;
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}
