use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_url: String,
    pub chat_duration_seconds: u64,
    pub survey_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".into(),
            chat_duration_seconds: 600,
            survey_base_url:
                "https://youruniversity.qualtrics.com/jfe/form/SV_YOUR_SURVEY_ID".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("kagami.toml") {
        apply_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Ok(v) = std::env::var("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Ok(v) = std::env::var("APP__CHAT_DURATION_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.chat_duration_seconds = parsed;
        }
    }

    if let Ok(v) = std::env::var("SURVEY_BASE_URL") {
        settings.survey_base_url = v;
    }
    if let Ok(v) = std::env::var("APP__SURVEY_BASE_URL") {
        settings.survey_base_url = v;
    }

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("backend_url") {
        settings.backend_url = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_duration_seconds") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.chat_duration_seconds = parsed;
        }
    }
    if let Some(v) = file_cfg.get("survey_base_url") {
        settings.survey_base_url = v.clone();
    }
}
