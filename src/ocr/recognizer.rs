use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info, warn};

use super::{normalize_reading, Provider, ProviderError, RecognitionHint};
use crate::core::model::{FailureKind, ProviderFailure, ProviderReading, ProviderRole};

/// Everything the providers produced for one unit or crop.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    /// Successful readings in provider order, empty ones included.
    pub readings: Vec<ProviderReading>,
    pub failures: Vec<ProviderFailure>,
    pub fallback_used: bool,
}

impl Recognition {
    /// First non-empty reading in provider order.
    pub fn primary(&self) -> Option<&ProviderReading> {
        self.readings.iter().find(|r| !r.is_empty())
    }

    pub fn alternates(&self) -> Vec<&ProviderReading> {
        self.readings.iter().filter(|r| !r.is_empty()).skip(1).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }

    pub fn reading(&self, provider: &str) -> Option<&ProviderReading> {
        self.readings.iter().find(|r| r.provider == provider)
    }

    pub fn failure(&self, provider: &str) -> Option<&ProviderFailure> {
        self.failures.iter().find(|f| f.provider == provider)
    }
}

/// Fans a unit out to every available provider, each on its own thread with
/// its own deadline. No provider failure escapes as an error.
pub struct Recognizer {
    providers: Vec<Arc<dyn Provider>>,
    unavailable: Vec<ProviderFailure>,
    fallback: bool,
}

impl Recognizer {
    pub fn new(providers: Vec<Arc<dyn Provider>>, fallback: bool) -> Self {
        let mut available = Vec::new();
        let mut unavailable = Vec::new();
        for provider in providers {
            if provider.is_available() {
                info!(provider = provider.name(), role = ?provider.role(), "provider ready");
                available.push(provider);
            } else {
                let hint = provider.availability_hint();
                warn!(provider = provider.name(), %hint, "provider unavailable, excluded from run");
                unavailable.push(ProviderFailure {
                    provider: provider.name().to_string(),
                    kind: FailureKind::Unavailable,
                    message: hint,
                });
            }
        }
        if !available.iter().any(|p| p.role() == ProviderRole::Classical) {
            warn!("no classical provider available; fallback re-reads are disabled");
        }
        Self {
            providers: available,
            unavailable,
            fallback,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn unavailable(&self) -> &[ProviderFailure] {
        &self.unavailable
    }

    pub fn classical(&self) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.role() == ProviderRole::Classical)
    }

    pub fn recognize(&self, image: &DynamicImage) -> Recognition {
        let shared = Arc::new(image.clone());
        let mut recognition = Recognition {
            failures: self.unavailable.clone(),
            ..Recognition::default()
        };

        for (provider, result) in self.call_all(&self.providers, &shared, RecognitionHint::Page) {
            match result {
                Ok(reading) => recognition.readings.push(reading),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "provider failed");
                    recognition.failures.push(failure(provider.as_ref(), &e));
                }
            }
        }

        if recognition.is_empty() && self.fallback {
            if let Some(classical) = self.classical() {
                debug!(provider = classical.name(), "all providers empty, running fallback");
                let mut results = self.call_all(
                    std::slice::from_ref(classical),
                    &shared,
                    RecognitionHint::Fallback,
                );
                match results.pop().map(|(_, result)| result) {
                    Some(Ok(reading)) => {
                        recognition.readings.retain(|r| r.provider != reading.provider);
                        recognition.readings.insert(0, reading);
                        recognition.fallback_used = true;
                    }
                    Some(Err(e)) => {
                        warn!(provider = classical.name(), error = %e, "fallback failed");
                        recognition.failures.push(failure(classical.as_ref(), &e));
                        recognition.fallback_used = true;
                    }
                    None => {}
                }
            }
        }
        recognition
    }

    /// Single-line re-read of a cropped band with the classical provider.
    pub fn recognize_line(&self, band: &DynamicImage) -> Option<ProviderReading> {
        let classical = self.classical()?;
        let shared = Arc::new(band.clone());
        let mut results = self.call_all(
            std::slice::from_ref(classical),
            &shared,
            RecognitionHint::SingleLine,
        );
        match results.pop()?.1 {
            Ok(reading) => Some(reading),
            Err(e) => {
                debug!(provider = classical.name(), error = %e, "line rescan failed");
                None
            }
        }
    }

    fn call_all(
        &self,
        providers: &[Arc<dyn Provider>],
        image: &Arc<DynamicImage>,
        hint: RecognitionHint,
    ) -> Vec<(Arc<dyn Provider>, Result<ProviderReading, ProviderError>)> {
        let start = Instant::now();
        let pending: Vec<_> = providers
            .iter()
            .map(|provider| {
                let (tx, rx) = mpsc::channel();
                let worker = Arc::clone(provider);
                let image = Arc::clone(image);
                thread::spawn(move || {
                    let result = worker.recognize(&image, hint).map(normalize_reading);
                    let _ = tx.send(result);
                });
                (Arc::clone(provider), rx)
            })
            .collect();

        pending
            .into_iter()
            .map(|(provider, rx)| {
                let remaining = provider.timeout().saturating_sub(start.elapsed());
                let result = match rx.recv_timeout(remaining) {
                    Ok(result) => result,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        Err(ProviderError::Timeout(provider.timeout()))
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        Err(ProviderError::Failed("provider thread panicked".to_string()))
                    }
                };
                (provider, result)
            })
            .collect()
    }
}

fn failure(provider: &dyn Provider, error: &ProviderError) -> ProviderFailure {
    ProviderFailure {
        provider: provider.name().to_string(),
        kind: error.kind(),
        message: error.to_string(),
    }
}
