pub mod amocrm_http;
pub mod amocrm_token;
pub mod dolyame;

pub use amocrm_http::{AmoCrmClientError, AmoCrmConfig, AmoCrmHttp};
pub use amocrm_token::{AccessTokenGetter, StaticAccessToken, TokenError};
pub use dolyame::{Dolyame, DolyameConfig, DolyameRequestError};
