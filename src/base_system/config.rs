//! 配置文件读写与带注释生成。
//!
//! 首次运行写出带注释的默认配置；之后读取用户文件，与默认值合并，
//! 若用户文件缺少字段则回写补全。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];

    /// 合并后的额外校验，默认不做。
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 读取（或创建）配置文件。
///
/// `base_dir` 为空时使用当前目录下的 `FILE_NAME`。
pub fn load_or_create<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = match base_dir {
        Some(base) => base.join(T::FILE_NAME),
        None => PathBuf::from(T::FILE_NAME),
    };
    load_or_create_at::<T>(&path)
}

pub fn load_or_create_at<T: ConfigSpec>(path: &Path) -> Result<T, ConfigError> {
    ensure_parent(path)?;

    if !path.exists() {
        let default_config = T::default();
        write_with_comments(&default_config, path)?;
        debug!(target: "config", path = %path.display(), "已生成默认配置");
        return Ok(default_config);
    }

    let user_yaml = read_yaml(path)?;
    let missing = missing_fields::<T>(&user_yaml);

    let mut merged = serde_yaml::to_value(T::default()).map_err(validation)?;
    merge_values(&mut merged, user_yaml);
    let config: T = serde_yaml::from_value(merged).map_err(validation)?;
    config.validate()?;

    if !missing.is_empty() {
        debug!(target: "config", ?missing, "配置缺少字段，回写补全");
        write_with_comments(&config, path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) = serde_yaml::to_value(config).map_err(validation)? else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut out = String::new();
    for field in T::fields() {
        if !field.description.is_empty() {
            for line in field.description.lines() {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let entry = serde_yaml::to_string(&Mapping::from_iter([(key, val)])).map_err(validation)?;
        out.push_str(entry.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn missing_fields<T: ConfigSpec>(user_yaml: &Value) -> Vec<&'static str> {
    let Value::Mapping(map) = user_yaml else {
        return T::fields().iter().map(|f| f.name).collect();
    };
    T::fields()
        .iter()
        .filter(|f| !map.contains_key(Value::String(f.name.to_string())))
        .map(|f| f.name)
        .collect()
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        // 空文件解析为 null，保留默认值
        (_, Value::Null) => {}
        (dest, other) => *dest = other,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn validation(err: serde_yaml::Error) -> ConfigError {
    ConfigError::Validation(err.to_string())
}
