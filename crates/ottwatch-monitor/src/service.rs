use serde::{Deserialize, Serialize};

/// Score awarded to a passing check. Failing checks score zero.
pub const PASS_SCORE: u32 = 100;

/// One monitored streaming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheckSpec {
    pub name: String,
    #[serde(flatten)]
    pub target: CheckTarget,
}

/// How a service is driven. Only checker implementations branch on this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CheckTarget {
    Browser {
        url: String,
    },
    Mobile {
        device: String,
        package: String,
        #[serde(default)]
        activity: Option<String>,
    },
}

impl CheckTarget {
    pub fn mode(&self) -> &'static str {
        match self {
            CheckTarget::Browser { .. } => "browser",
            CheckTarget::Mobile { .. } => "mobile",
        }
    }
}

impl ServiceCheckSpec {
    pub fn browser(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: CheckTarget::Browser { url: url.into() },
        }
    }

    pub fn mobile(
        name: impl Into<String>,
        device: impl Into<String>,
        package: impl Into<String>,
        activity: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: CheckTarget::Mobile {
                device: device.into(),
                package: package.into(),
                activity,
            },
        }
    }
}

/// Result of one checker invocation.
///
/// `success == false` with `error == None` is an ordinary negative result
/// ("no video element"); a populated `error` means the check itself broke.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub success: bool,
    #[serde(default)]
    pub drm_handshake_detected: bool,
    #[serde(default)]
    pub final_artifact: Option<String>,
    #[serde(default)]
    pub drm_artifact: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn passed(final_artifact: Option<String>) -> Self {
        Self {
            success: true,
            final_artifact,
            ..Self::default()
        }
    }

    pub fn failed(final_artifact: Option<String>) -> Self {
        Self {
            success: false,
            final_artifact,
            ..Self::default()
        }
    }

    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_drm(mut self, drm_artifact: impl Into<String>) -> Self {
        self.drm_handshake_detected = true;
        self.drm_artifact = Some(drm_artifact.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn score(&self) -> u32 {
        if self.success {
            PASS_SCORE
        } else {
            0
        }
    }
}

pub fn validate_spec(spec: &ServiceCheckSpec) -> Result<(), String> {
    if spec.name.trim().is_empty() {
        return Err("service name is required".to_string());
    }

    match &spec.target {
        CheckTarget::Browser { url } => {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| format!("{}: invalid URL: {e}", spec.name))?;
            match parsed.scheme() {
                "http" | "https" => Ok(()),
                _ => Err(format!("{}: URL must be http or https", spec.name)),
            }
        }
        CheckTarget::Mobile {
            device, package, ..
        } => {
            if device.trim().is_empty() {
                return Err(format!("{}: mobile device is required", spec.name));
            }
            if package.trim().is_empty() {
                return Err(format!("{}: mobile package is required", spec.name));
            }
            Ok(())
        }
    }
}
