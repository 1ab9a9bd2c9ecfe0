//! Random sampling over the bundled hadith collections.
//!
//! The datasets are static JSON files, one per collection. Selection is a
//! bounded-retry draw: pick a collection, pick an entry, reject blank
//! entries, give up after a fixed number of attempts rather than looping
//! forever on a degenerate dataset.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

const MAX_ATTEMPTS: usize = 50;

/// Display names for the bundled collection files; unknown files fall back
/// to their stem.
const COLLECTION_NAMES: [(&str, &str); 7] = [
    ("tur-bukhari", "Sahih-i Buhârî"),
    ("tur-muslim", "Sahih-i Muslim"),
    ("tur-ibnmajah", "Sünen-i İbn Mâce"),
    ("tur-malik", "Muvatta İmam Mâlik"),
    ("tur-nasai", "Sünen-i Nesâî"),
    ("tur-tirmidhi", "Câmiu's-Sahih (Tirmizî)"),
    ("tur-abudawud", "Sünen-i Ebû Dâvûd"),
];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Hadith {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reference: Option<HadithReference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HadithReference {
    pub book: i64,
    pub hadith: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct CollectionFile {
    #[serde(default)]
    hadiths: Vec<Hadith>,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub hadiths: Vec<Hadith>,
}

/// One draw, ready to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampledText {
    pub text: String,
    pub source: String,
    pub reference: Option<HadithReference>,
}

#[derive(Debug, Clone, Default)]
pub struct TextLibrary {
    collections: Vec<Collection>,
}

impl TextLibrary {
    pub fn new(collections: Vec<Collection>) -> Self {
        Self { collections }
    }

    /// Read every `*.json` under `dir`. A missing or unreadable directory
    /// yields an empty library; the dashboard works without texts.
    pub async fn load(dir: &Path) -> Self {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::info!("no text datasets at {}: {err}", dir.display());
                return Self::default();
            }
        };

        let mut collections = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();

            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<CollectionFile>(&bytes) {
                    Ok(file) => collections.push(Collection {
                        name: display_name(&stem),
                        hadiths: file.hadiths,
                    }),
                    Err(err) => tracing::warn!("skipping {}: {err}", path.display()),
                },
                Err(err) => tracing::warn!("skipping {}: {err}", path.display()),
            }
        }

        tracing::info!(collections = collections.len(), "text library loaded");
        Self { collections }
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Bounded-retry random draw: blank entries are rejected and redrawn;
    /// `None` after [MAX_ATTEMPTS] misses.
    pub fn sample(&self, rng: &mut impl Rng) -> Option<SampledText> {
        if self.collections.is_empty() {
            return None;
        }

        for _ in 0..MAX_ATTEMPTS {
            let collection = &self.collections[rng.gen_range(0..self.collections.len())];
            if collection.hadiths.is_empty() {
                continue;
            }

            let hadith = &collection.hadiths[rng.gen_range(0..collection.hadiths.len())];
            if hadith.text.trim().is_empty() {
                continue;
            }

            return Some(SampledText {
                text: hadith.text.clone(),
                source: collection.name.clone(),
                reference: hadith.reference,
            });
        }

        tracing::warn!("no usable text found in {MAX_ATTEMPTS} draws");
        None
    }
}

fn display_name(stem: &str) -> String {
    COLLECTION_NAMES
        .iter()
        .find(|(file, _)| *file == stem)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| stem.to_string())
}
