// IMPORTANT:
// Keep ALL numeric values and fixed names centralized here (no hardcoded values scattered around).

// NOTE: APP_VERSION must stay in sync with the `version` field in Cargo.toml.
pub const APP_VERSION: &str = "0.1.0";

pub mod defaults {
    pub const EMAILS_DB_PATH: &str = "emails.db";
    pub const EMBEDDINGS_DB_PATH: &str = "embedded_emails.db";
    pub const CREDENTIALS_PATH: &str = "credentials.json";
    pub const TOKEN_PATH: &str = "token.json";

    // First page only: the list call is not paginated further.
    pub const MAX_EMAILS: u32 = 1000;
    pub const EMBED_BATCH_SIZE: usize = 2500;
    pub const NUM_RESULTS: usize = 2;
}

pub mod demo {
    pub const CSV_PATH: &str = "data/Phishing_email.csv";
    pub const DATABASE_PATH: &str = "demo_emails.db";
    pub const BODY_COLUMN: &str = "Email Text";

    // Cells treated as missing, matching the usual spreadsheet/pandas NA spellings.
    pub const NA_VALUES: &[&str] = &[
        "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
        "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
    ];
}

pub mod logging {
    pub const LOG_DIR_REL: &str = ".inbox-search/logs";
    pub const LOG_FILE_NAME: &str = "inbox_search.log";
    pub const DEFAULT_LEVEL: &str = "info";

    pub const LOG_ROTATE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const LOG_ROTATE_KEEP_FILES: usize = 5;
}

pub mod http {
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 90;
}

pub mod gmail {
    pub const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
    pub const SCOPE_READONLY: &str = "https://www.googleapis.com/auth/gmail.readonly";
    pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

    // Treat a token this close to expiry as already expired.
    pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;
}

pub mod normalize {
    pub const NO_BODY_MARKER: &str = "No body text found.";
    pub const UNKNOWN_EXTENSION: &str = "unknown";
    pub const MIME_TEXT_PLAIN: &str = "text/plain";
    pub const MIME_TEXT_HTML: &str = "text/html";
}

pub mod sqlite {
    pub const PRAGMA_BUSY_TIMEOUT_MS: i64 = 2000;
    pub const PRAGMA_CACHE_SIZE_KIB_NEG: i64 = -64000;
    pub const PRAGMA_MMAP_SIZE_BYTES: i64 = 268_435_456;
    pub const PRAGMA_WAL_AUTOCHECKPOINT_PAGES: i64 = 200_000;

    pub const EMAILS_TABLE: &str = "emails";
}

pub mod vectors {
    // Fixed collection name inside the embeddings database.
    pub const COLLECTION_NAME: &str = "emails";

    // sqlite-vec rejects KNN queries with k above this.
    pub const MAX_KNN_K: usize = 4096;
}

pub mod embedding {
    pub const DEFAULT_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";

    // Max word-piece tokens for all-MiniLM-L6-v2 (model context limit is 256).
    // We pre-truncate to control what gets embedded.
    pub const MAX_TOKENS: usize = 256;

    // Model download URL base (lazy download on first use).
    pub const MODEL_HUB_BASE: &str = "https://huggingface.co";
    pub const MODEL_REVISION: &str = "main";
    pub const MODEL_FILES: [&str; 3] = ["model.safetensors", "tokenizer.json", "config.json"];

    // SHA256 pins for integrity verification (default model only).
    pub const PINNED_SHA256: &[(&str, &str, &str)] = &[(
        DEFAULT_MODEL_NAME,
        "model.safetensors",
        "53aa51172d142c89d9012cce15ae4d6cc0ca6895895114379cacb4fab128d9db",
    )];

    // Local model storage directory (relative to home)
    pub const MODEL_DIR_REL: &str = ".inbox-search/models";
}
