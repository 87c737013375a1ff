//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use crate::observability::ObservabilityConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许发起异步评估的站点来源，逗号分隔；"*" 表示任意来源
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_cors_origins() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    /// 拆分后的来源列表，None 表示任意来源
    pub fn allowed_origins(&self) -> Option<Vec<String>> {
        let raw = self.cors_origins.trim();
        if raw.is_empty() || raw == "*" {
            return None;
        }
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

/// 条件引擎配置
///
/// 两个数据文件都是可选的：缺少规则文件时所有单元都没有条件（全部展示），
/// 缺少内容目录时与文章相关的事实一律解析为空值。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// 展示单元规则集 JSON 文件
    pub rules_path: Option<PathBuf>,
    /// 文章目录 JSON 文件（上下文模式下按文章 ID 查询作者、分类等）
    pub catalog_path: Option<PathBuf>,
    /// 评估时是否记录逐行追踪日志
    #[serde(default)]
    pub trace_evaluations: bool,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（DISPLAY_ 前缀，如 DISPLAY_SERVER__PORT -> server.port）
    /// 5. 服务端口环境变量（如 DISPLAY_CONDITIONS_PORT）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("DISPLAY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("DISPLAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = Self::service_port_from_env(service_name) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 将 "display-conditions" 转换为 "DISPLAY_CONDITIONS_PORT" 并读取
    fn service_port_from_env(service_name: &str) -> Option<u16> {
        let env_var_name = Self::port_env_var(service_name);
        std::env::var(&env_var_name)
            .ok()
            .and_then(|v| v.parse().ok())
    }

    fn port_env_var(service_name: &str) -> String {
        format!("{}_PORT", service_name.to_uppercase().replace('-', "_"))
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
