use crate::error::{AppError, AppResult};
use crate::services::{AmoCrmConfig, DolyameConfig};

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub amocrm: Option<AmoCrmConfig>,
    pub dolyame: Option<DolyameConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            amocrm: AmoCrmConfig::from_env(),
            dolyame: DolyameConfig::from_env(),
        }
    }

    pub fn amocrm(&self) -> AppResult<&AmoCrmConfig> {
        self.amocrm.as_ref().ok_or_else(|| {
            AppError::NotConfigured("amoCRM is not configured. Set AMOCRM_BASE_URL.".to_string())
        })
    }

    pub fn dolyame(&self) -> AppResult<&DolyameConfig> {
        self.dolyame.as_ref().ok_or_else(|| {
            AppError::NotConfigured(
                "Dolyame is not configured. Set DOLYAME_LOGIN, DOLYAME_PASSWORD and ABSOLUTE_HOST."
                    .to_string(),
            )
        })
    }
}
