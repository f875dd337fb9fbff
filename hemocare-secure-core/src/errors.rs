pub use hemocare_secure_spec::{DecryptError, DecryptResult, Error, Result, UsageError, UsageResult};
