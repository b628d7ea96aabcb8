//! Runtime-editable state: settings and the issuing company's firm data.
//!
//! Both live in `<data_dir>` as pretty JSON (`einstellungen.json`,
//! `firmendaten.json`). The [`ConfigStore`] loads them at startup, hands
//! out immutable snapshots to jobs, and applies updates under one write
//! lock: validate, persist atomically, then swap.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::countries::is_known_country_code;
use crate::core::iban::validate_iban;
use crate::core::{RechnungError, ValidationError};

pub const SETTINGS_FILE: &str = "einstellungen.json";
pub const ISSUER_FILE: &str = "firmendaten.json";

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm_model_path: String,
    pub logo_path: String,
    /// Directory of the most recent job; written by the pipeline only.
    pub last_output_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_model_path: "models/model.gguf".into(),
            logo_path: String::new(),
            last_output_path: String::new(),
        }
    }
}

/// Client-writable part of [`Settings`]; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub llm_model_path: Option<String>,
    pub logo_path: Option<String>,
}

/// Firm data of the issuing company (seller).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerProfile {
    pub name: String,
    pub umsatzsteuer_id: String,
    pub steuernummer: String,
    pub anschrift: Anschrift,
    pub zahlung: Zahlung,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kontakt: Option<Kontakt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anschrift {
    pub strasse: String,
    pub plz: String,
    pub ort: String,
    pub land: String,
}

impl Default for Anschrift {
    fn default() -> Self {
        Self {
            strasse: String::new(),
            plz: String::new(),
            ort: String::new(),
            land: "DE".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Zahlung {
    pub zahlungsart: String,
    pub iban: String,
    pub bic: String,
}

impl Default for Zahlung {
    fn default() -> Self {
        Self {
            zahlungsart: "SEPA".into(),
            iban: String::new(),
            bic: String::new(),
        }
    }
}

/// Seller contact (BG-6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Kontakt {
    pub name: String,
    pub telefon: String,
    pub email: String,
}

impl IssuerProfile {
    /// Field-level checks applied before an update is stored.
    ///
    /// Completeness is not required here; an incomplete profile is stored
    /// and fails invoice validation instead.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let iban = self.zahlung.iban.trim();
        if !iban.is_empty() {
            if let Err(e) = validate_iban(iban) {
                errors.push(ValidationError::new("zahlung.iban", e.to_string()));
            }
        }

        let bic = self.zahlung.bic.trim();
        if !bic.is_empty()
            && !(matches!(bic.len(), 8 | 11) && bic.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            errors.push(ValidationError::new(
                "zahlung.bic",
                format!("'{bic}' is not an 8 or 11 character BIC"),
            ));
        }

        let land = self.anschrift.land.trim();
        if !is_known_country_code(land) {
            errors.push(ValidationError::new(
                "anschrift.land",
                format!("'{land}' is not an ISO 3166-1 alpha-2 country code"),
            ));
        }

        if let Some(kontakt) = &self.kontakt {
            let email = kontakt.email.trim();
            if !email.is_empty() && !email.contains('@') {
                errors.push(ValidationError::new(
                    "kontakt.email",
                    format!("'{email}' is not an e-mail address"),
                ));
            }
        }
        errors
    }
}

/// Configuration seen by one job from start to finish.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub settings: Settings,
    pub issuer: IssuerProfile,
}

/// Loads, snapshots and transactionally updates the persisted state.
#[derive(Debug)]
pub struct ConfigStore {
    data_dir: PathBuf,
    state: RwLock<ConfigSnapshot>,
}

impl ConfigStore {
    /// Load both files from `data_dir`, writing defaults for missing ones.
    ///
    /// An unreadable file falls back to defaults with a warning and is left
    /// untouched until the next update.
    pub async fn load(data_dir: impl Into<PathBuf>) -> Result<Self, RechnungError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| RechnungError::storage(&data_dir, e))?;

        let settings: Settings = load_or_init(&data_dir.join(SETTINGS_FILE)).await?;
        let issuer: IssuerProfile = load_or_init(&data_dir.join(ISSUER_FILE)).await?;
        info!(data_dir = %data_dir.display(), "configuration loaded");

        Ok(Self {
            data_dir,
            state: RwLock::new(ConfigSnapshot { settings, issuer }),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub async fn snapshot(&self) -> ConfigSnapshot {
        self.state.read().await.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.state.read().await.settings.clone()
    }

    pub async fn issuer(&self) -> IssuerProfile {
        self.state.read().await.issuer.clone()
    }

    /// Apply the client-writable settings and persist them.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, RechnungError> {
        let mut state = self.state.write().await;
        let mut settings = state.settings.clone();
        if let Some(path) = update.llm_model_path {
            settings.llm_model_path = path.trim().to_string();
        }
        if let Some(path) = update.logo_path {
            settings.logo_path = path.trim().to_string();
        }
        write_json(&self.data_dir.join(SETTINGS_FILE), &settings).await?;
        state.settings = settings.clone();
        info!("settings updated");
        Ok(settings)
    }

    /// Validate and store new firm data.
    pub async fn update_issuer(&self, profile: IssuerProfile) -> Result<IssuerProfile, RechnungError> {
        let profile = normalize_profile(profile);
        RechnungError::check(profile.validate())?;

        let mut state = self.state.write().await;
        write_json(&self.data_dir.join(ISSUER_FILE), &profile).await?;
        state.issuer = profile.clone();
        info!(name = %profile.name, "firm data updated");
        Ok(profile)
    }

    /// Remember the directory of the latest finished job.
    pub async fn record_output_path(&self, path: &Path) -> Result<(), RechnungError> {
        let mut state = self.state.write().await;
        let mut settings = state.settings.clone();
        settings.last_output_path = path.display().to_string();
        write_json(&self.data_dir.join(SETTINGS_FILE), &settings).await?;
        state.settings = settings;
        Ok(())
    }
}

fn normalize_profile(mut profile: IssuerProfile) -> IssuerProfile {
    let trim = |s: &mut String| *s = s.trim().to_string();
    trim(&mut profile.name);
    trim(&mut profile.umsatzsteuer_id);
    trim(&mut profile.steuernummer);
    trim(&mut profile.anschrift.strasse);
    trim(&mut profile.anschrift.plz);
    trim(&mut profile.anschrift.ort);
    profile.anschrift.land = profile.anschrift.land.trim().to_uppercase();
    if profile.anschrift.land.is_empty() {
        profile.anschrift.land = "DE".into();
    }
    trim(&mut profile.zahlung.zahlungsart);
    if profile.zahlung.zahlungsart.is_empty() {
        profile.zahlung.zahlungsart = "SEPA".into();
    }
    profile.zahlung.iban = profile
        .zahlung
        .iban
        .split_whitespace()
        .collect::<String>()
        .to_uppercase();
    profile.zahlung.bic = profile.zahlung.bic.trim().to_uppercase();
    if let Some(kontakt) = profile.kontakt.as_mut() {
        trim(&mut kontakt.name);
        trim(&mut kontakt.telefon);
        trim(&mut kontakt.email);
    }
    profile
}

async fn load_or_init<T>(path: &Path) -> Result<T, RechnungError>
where
    T: Default + Serialize + DeserializeOwned,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable config file, using defaults");
                Ok(T::default())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let value = T::default();
            write_json(path, &value).await?;
            Ok(value)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config file, using defaults");
            Ok(T::default())
        }
    }
}

/// Pretty JSON through a temporary file and rename.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RechnungError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        RechnungError::storage(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| RechnungError::storage(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RechnungError::storage(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_are_written_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path()).await.unwrap();
        assert_eq!(store.settings().await, Settings::default());

        let raw = std::fs::read_to_string(dir.path().join(ISSUER_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["anschrift"]["land"], "DE");
        assert_eq!(json["zahlung"]["zahlungsart"], "SEPA");
        assert!(json.get("kontakt").is_none());
    }

    #[tokio::test]
    async fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ kaputt").unwrap();
        let store = ConfigStore::load(dir.path()).await.unwrap();
        assert_eq!(store.settings().await, Settings::default());
    }

    #[tokio::test]
    async fn partial_settings_update_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path()).await.unwrap();
        store.record_output_path(Path::new("/out/job")).await.unwrap();

        let update: SettingsUpdate = serde_json::from_str(
            r#"{"logo_path": "/srv/logo.png", "last_output_path": "/etc"}"#,
        )
        .unwrap();
        let settings = store.update_settings(update).await.unwrap();
        assert_eq!(settings.logo_path, "/srv/logo.png");
        assert_eq!(settings.llm_model_path, "models/model.gguf");
        assert_eq!(settings.last_output_path, "/out/job");

        let reloaded = ConfigStore::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.settings().await, settings);
    }

    #[tokio::test]
    async fn invalid_firm_data_is_rejected_and_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path()).await.unwrap();
        let mut profile = IssuerProfile {
            name: "ACME GmbH".into(),
            ..IssuerProfile::default()
        };
        profile.zahlung.iban = "DE00 1234 5678 9012 3456 78".into();
        profile.anschrift.land = "XX".into();

        let err = store.update_issuer(profile).await.unwrap_err();
        let fields: Vec<_> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, ["zahlung.iban", "anschrift.land"]);
        assert_eq!(store.issuer().await, IssuerProfile::default());
    }

    #[tokio::test]
    async fn firm_data_is_normalized_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path()).await.unwrap();
        let profile: IssuerProfile = serde_json::from_str(
            r#"{"name": " ACME GmbH ", "anschrift": {"ort": "Berlin", "land": "de"},
                "zahlung": {"iban": "de89 3704 0044 0532 0130 00", "zahlungsart": ""}}"#,
        )
        .unwrap();
        let stored = store.update_issuer(profile).await.unwrap();
        assert_eq!(stored.name, "ACME GmbH");
        assert_eq!(stored.anschrift.land, "DE");
        assert_eq!(stored.zahlung.iban, "DE89370400440532013000");
        assert_eq!(stored.zahlung.zahlungsart, "SEPA");

        let reloaded = ConfigStore::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.issuer().await, stored);
    }
}
