// Domain-layer modules and shared errors/models
pub mod prompt {
    pub use crate::prompt::*;
}

pub mod normalizer {
    pub use crate::normalizer::*;
}

pub mod enrichment {
    pub use crate::enrichment::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod errors {
    pub use crate::errors::*;
}
