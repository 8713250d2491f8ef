use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_storage_backend, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, RuntimeSettings,
    ServerHost, ServerPort, ServerSettings, Settings, StorageBackend, StorageSettings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("LMS_HOST", "0.0.0.0");
        let port = env_or_default("LMS_PORT", "8000");

        let environment =
            parse_environment(env_optional("LMS_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("LMS_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "LMS Exam API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let backend = parse_storage_backend(env_optional("STORAGE_BACKEND"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "lms");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "lms_exam");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "20"),
        )?;

        let answer_grace_seconds =
            parse_u64("ANSWER_GRACE_SECONDS", env_or_default("ANSWER_GRACE_SECONDS", "30"))?;

        let log_level = env_or_default("LMS_LOG_LEVEL", "info");
        let json = env_optional("LMS_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            storage: StorageSettings { backend },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            exam: ExamSettings { answer_grace_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        if !self.api.api_v1_str.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "API_V1_STR",
                value: self.api.api_v1_str.clone(),
            });
        }

        if self.runtime.environment.is_production()
            && self.storage.backend == StorageBackend::Memory
        {
            return Err(ConfigError::InvalidValue {
                field: "STORAGE_BACKEND",
                value: StorageBackend::Memory.as_str().to_string(),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.storage.backend == StorageBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
