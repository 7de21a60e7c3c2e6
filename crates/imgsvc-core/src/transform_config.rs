//! # Transform Configurations and Canonical cfgKeys
//!
//! A [`TransformConfig`] describes one requested variant. Its canonical
//! string form, the [`CfgKey`], is the sort component of every Variant Index
//! key and the suffix of every formatted object key.
//!
//! ## Canonicalization Rules
//!
//! 1. Parameter order and aliases are irrelevant (`w`/`width`, `h`/`height`,
//!    `fmt`/`format`, `q`/`quality`, `fit`). Names are case-insensitive.
//! 2. Format names are case-insensitive and `jpg` is `jpeg`.
//! 3. Numbers are parsed as integers, so `0100` and `100` are equal.
//! 4. Quality only survives for formats whose encoder uses it, and an absent
//!    JPEG quality is the default quality. Repeated, differing qualities are
//!    a conflict only for those formats.
//! 5. `fit` is omitted from the key when it is the default (`contain`).
//!
//! Normalization happens on construction, so two `TransformConfig` values
//! compare equal exactly when they produce the same [`CfgKey`].
//!
//! ```text
//! w=100&h=100&fmt=webp          -> 100x100-webp
//! format=JPG&height=60&width=80 -> 80x60-jpeg-q85
//! w=640&h=480&fmt=png&fit=cover -> 640x480-png-cover
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = 8192;

/// Quality used for JPEG output when the request does not name one.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Output encoding of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG (lossless).
    #[default]
    Png,
    /// JPEG (lossy, quality-controlled).
    Jpeg,
    /// WebP (lossless encoder).
    Webp,
    /// GIF.
    Gif,
}

impl OutputFormat {
    /// Parse a format name, case-insensitively. `jpg` is accepted for JPEG.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "gif" => Ok(Self::Gif),
            _ => Err(ValidationError::InvalidParameter {
                name: "format",
                value: raw.to_string(),
            }),
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// MIME type served for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Whether the encoder for this format honours a quality setting.
    pub fn uses_quality(&self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the source image is mapped onto the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Scale to fit inside the box, preserving aspect ratio.
    #[default]
    Contain,
    /// Scale and center-crop to exactly fill the box.
    Cover,
    /// Stretch to exactly the box, ignoring aspect ratio.
    Fill,
}

impl FitMode {
    /// Parse a fit mode name, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(Self::Contain),
            "cover" => Ok(Self::Cover),
            "fill" => Ok(Self::Fill),
            _ => Err(ValidationError::InvalidParameter {
                name: "fit",
                value: raw.to_string(),
            }),
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contain => "contain",
            Self::Cover => "cover",
            Self::Fill => "fill",
        }
    }
}

/// A validated, normalized description of one variant.
///
/// Fields are private: every value is built through [`TransformConfig::new`],
/// [`TransformConfig::from_query`], [`TransformConfig::from_cfg_key`] or serde,
/// all of which validate and normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTransformConfig")]
pub struct TransformConfig {
    width: u32,
    height: u32,
    format: OutputFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<u8>,
    fit: FitMode,
}

/// Unvalidated serde shape of a [`TransformConfig`].
///
/// Accepts bare `{ "width", "height" }` documents, with every other field
/// optional.
#[derive(Debug, Deserialize)]
struct RawTransformConfig {
    width: u32,
    height: u32,
    #[serde(default)]
    format: OutputFormat,
    #[serde(default)]
    quality: Option<u8>,
    #[serde(default)]
    fit: FitMode,
}

impl TryFrom<RawTransformConfig> for TransformConfig {
    type Error = ValidationError;

    fn try_from(raw: RawTransformConfig) -> Result<Self, Self::Error> {
        let mut cfg = TransformConfig::new(raw.width, raw.height, raw.format)?.with_fit(raw.fit);
        if let Some(q) = raw.quality {
            cfg = cfg.with_quality(q)?;
        }
        Ok(cfg)
    }
}

impl TransformConfig {
    /// Build a config with the default fit and quality.
    pub fn new(width: u32, height: u32, format: OutputFormat) -> Result<Self, ValidationError> {
        check_range("width", u64::from(width), 1, u64::from(MAX_DIMENSION))?;
        check_range("height", u64::from(height), 1, u64::from(MAX_DIMENSION))?;
        let quality = format.uses_quality().then_some(DEFAULT_JPEG_QUALITY);
        Ok(Self {
            width,
            height,
            format,
            quality,
            fit: FitMode::Contain,
        })
    }

    /// Set the encoder quality (1 to 100). Dropped for formats that ignore it.
    pub fn with_quality(mut self, quality: u8) -> Result<Self, ValidationError> {
        check_range("quality", u64::from(quality), 1, 100)?;
        if self.format.uses_quality() {
            self.quality = Some(quality);
        }
        Ok(self)
    }

    /// Set the fit mode.
    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    /// Target width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Target height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Effective encoder quality, `None` for formats that ignore it.
    pub fn quality(&self) -> Option<u8> {
        self.quality
    }

    /// Fit mode.
    pub fn fit(&self) -> FitMode {
        self.fit
    }

    /// The canonical cache key for this config.
    pub fn cfg_key(&self) -> CfgKey {
        let mut key = format!("{}x{}-{}", self.width, self.height, self.format);
        if let Some(q) = self.quality {
            key.push_str(&format!("-q{q}"));
        }
        if self.fit != FitMode::Contain {
            key.push('-');
            key.push_str(self.fit.as_str());
        }
        CfgKey(key)
    }

    /// Parse a URL query string (`w=100&h=100&fmt=webp`).
    ///
    /// Values are percent-decoded. Empty pairs (`a=1&&b=2`) are ignored.
    pub fn from_query(query: &str) -> Result<Self, ValidationError> {
        let pairs = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes());
        Self::from_pairs(pairs)
    }

    /// Build a config from decoded `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut width = None;
        let mut height = None;
        let mut format = None;
        let mut quality = None;
        // Conflicting qualities only matter once the format is known.
        let mut quality_conflict = false;
        let mut fit = None;

        for (name, value) in pairs {
            let raw_name = name.as_ref().trim();
            let value = value.as_ref();
            match raw_name.to_ascii_lowercase().as_str() {
                "" => continue,
                "w" | "width" => set_once(&mut width, "width", parse_number("width", value)?)?,
                "h" | "height" => set_once(&mut height, "height", parse_number("height", value)?)?,
                "fmt" | "format" => set_once(&mut format, "format", OutputFormat::parse(value)?)?,
                "q" | "quality" => {
                    let q = parse_number("quality", value)?;
                    match quality {
                        Some(existing) if existing != q => quality_conflict = true,
                        Some(_) => {}
                        None => quality = Some(q),
                    }
                }
                "fit" => set_once(&mut fit, "fit", FitMode::parse(value)?)?,
                _ => return Err(ValidationError::UnknownParameter(raw_name.to_string())),
            }
        }

        let format = format.unwrap_or_default();
        if quality_conflict && format.uses_quality() {
            return Err(ValidationError::ConflictingParameter("quality"));
        }

        let width = width.ok_or(ValidationError::MissingParameter("width"))?;
        let height = height.ok_or(ValidationError::MissingParameter("height"))?;
        check_range("width", width, 1, u64::from(MAX_DIMENSION))?;
        check_range("height", height, 1, u64::from(MAX_DIMENSION))?;

        // Both values were range-checked above, so the narrowing is lossless.
        let mut cfg = Self::new(width as u32, height as u32, format)?
            .with_fit(fit.unwrap_or_default());
        if let Some(q) = quality {
            check_range("quality", q, 1, 100)?;
            cfg = cfg.with_quality(q as u8)?;
        }
        Ok(cfg)
    }

    /// Parse a canonical cfgKey back into its config.
    ///
    /// Only canonical keys are accepted: `100x100-webp` parses,
    /// `100x100-WEBP` and `100x100-webp-q90` do not.
    pub fn from_cfg_key(key: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedCfgKey(key.to_string());

        let mut parts = key.split('-');
        let dims = parts.next().ok_or_else(malformed)?;
        let (w, h) = dims.split_once('x').ok_or_else(malformed)?;
        let width: u32 = w.parse().map_err(|_| malformed())?;
        let height: u32 = h.parse().map_err(|_| malformed())?;
        let format = parts
            .next()
            .ok_or_else(malformed)
            .and_then(|f| OutputFormat::parse(f).map_err(|_| malformed()))?;

        let mut cfg = Self::new(width, height, format).map_err(|_| malformed())?;
        for part in parts {
            match part.strip_prefix('q').map(str::parse::<u8>) {
                Some(Ok(q)) => cfg = cfg.with_quality(q).map_err(|_| malformed())?,
                Some(Err(_)) => return Err(malformed()),
                None => cfg = cfg.with_fit(FitMode::parse(part).map_err(|_| malformed())?),
            }
        }

        if cfg.cfg_key().as_str() != key {
            return Err(malformed());
        }
        Ok(cfg)
    }

    /// Render the config as a canonical query string.
    pub fn to_query(&self) -> String {
        let mut query = format!("w={}&h={}&fmt={}", self.width, self.height, self.format);
        if let Some(q) = self.quality {
            query.push_str(&format!("&q={q}"));
        }
        if self.fit != FitMode::Contain {
            query.push_str(&format!("&fit={}", self.fit.as_str()));
        }
        query
    }
}

impl std::fmt::Display for TransformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cfg_key().as_str())
    }
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn parse_number(name: &'static str, raw: &str) -> Result<u64, ValidationError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidParameter {
            name,
            value: raw.to_string(),
        })
}

fn set_once<T: PartialEq>(
    slot: &mut Option<T>,
    name: &'static str,
    value: T,
) -> Result<(), ValidationError> {
    match slot {
        Some(existing) if *existing != value => Err(ValidationError::ConflictingParameter(name)),
        Some(_) => Ok(()),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// Canonical string encoding of a [`TransformConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CfgKey(String);

impl CfgKey {
    /// Validate a canonical key string.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        TransformConfig::from_cfg_key(raw).map(|cfg| cfg.cfg_key())
    }

    /// Recover the config this key encodes.
    pub fn to_config(&self) -> Result<TransformConfig, ValidationError> {
        TransformConfig::from_cfg_key(&self.0)
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CfgKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CfgKey> for String {
    fn from(key: CfgKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for CfgKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
