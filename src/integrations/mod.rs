//! External service integrations.

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod website_scraper {
    pub use crate::website_scraper::*;
}

pub mod storage {
    pub use crate::export::*;
    pub use crate::report_store::*;
}
