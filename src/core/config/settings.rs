use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_environment, parse_i32, parse_i64, parse_u16,
};
use super::types::{
    ConfigError, DatabaseSettings, GradingSettings, RuntimeSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment =
            parse_environment(env_optional("PRACTEST_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("PRACTEST_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "practest");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "practest_db");
        let database_url = env_optional("DATABASE_URL");

        let submit_grace_seconds = parse_i64(
            "PRACTEST_SUBMIT_GRACE_SECONDS",
            env_or_default("PRACTEST_SUBMIT_GRACE_SECONDS", "90"),
        )?;
        let section_scale_cap = parse_i32(
            "PRACTEST_SECTION_SCALE_CAP",
            env_or_default("PRACTEST_SECTION_SCALE_CAP", "495"),
        )?;

        let log_level = env_or_default("PRACTEST_LOG_LEVEL", "info");
        let json = env_optional("PRACTEST_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            grading: GradingSettings { submit_grace_seconds, section_scale_cap },
            telemetry: TelemetrySettings { log_level, json },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.grading.submit_grace_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                field: "PRACTEST_SUBMIT_GRACE_SECONDS",
                value: self.grading.submit_grace_seconds.to_string(),
            });
        }

        if self.grading.section_scale_cap <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "PRACTEST_SECTION_SCALE_CAP",
                value: self.grading.section_scale_cap.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
