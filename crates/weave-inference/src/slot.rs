//! Process-wide model handle.
//!
//! A [`ModelSlot`] owns at most one loaded model. The model is built by the
//! slot's loader on first acquire and then reused; a failed load leaves the
//! slot empty so the next acquire tries again. Access is exclusive: a
//! [`ModelGuard`] is the only way to reach the model and only one exists at a
//! time, so at most one inference runs per slot.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

use crate::error::InferenceError;

pub type ModelGuard<M> = OwnedMappedMutexGuard<Option<M>, M>;

type Loader<M> = Arc<dyn Fn() -> Result<M, InferenceError> + Send + Sync>;

pub struct ModelSlot<M> {
    name: &'static str,
    model: Arc<Mutex<Option<M>>>,
    loader: Loader<M>,
}

impl<M> Clone for ModelSlot<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            model: self.model.clone(),
            loader: self.loader.clone(),
        }
    }
}

impl<M: Send + 'static> ModelSlot<M> {
    pub fn new<F>(name: &'static str, loader: F) -> Self
    where
        F: Fn() -> Result<M, InferenceError> + Send + Sync + 'static,
    {
        Self {
            name,
            model: Arc::new(Mutex::new(None)),
            loader: Arc::new(loader),
        }
    }

    /// A slot that already holds `model`.
    pub fn loaded(name: &'static str, model: M) -> Self {
        Self {
            name,
            model: Arc::new(Mutex::new(Some(model))),
            loader: Arc::new(move || {
                Err(InferenceError::ModelUnavailable(format!(
                    "{} has no loader",
                    name
                )))
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn is_loaded(&self) -> bool {
        self.model.lock().await.is_some()
    }

    /// Wait for exclusive access, loading the model first if needed.
    /// The loader runs on the blocking pool.
    pub async fn acquire(&self) -> Result<ModelGuard<M>, InferenceError> {
        let mut guard = self.model.clone().lock_owned().await;
        if guard.is_none() {
            tracing::info!(model = self.name, "Loading model");
            let loader = self.loader.clone();
            let model = tokio::task::spawn_blocking(move || loader()).await??;
            *guard = Some(model);
            tracing::info!(model = self.name, "Model loaded");
        }
        self.map(guard)
    }

    /// Blocking variant of [`ModelSlot::acquire`]. Must not be called from
    /// async code; use it inside `spawn_blocking`.
    pub fn acquire_blocking(&self) -> Result<ModelGuard<M>, InferenceError> {
        let mut guard = self.model.clone().blocking_lock_owned();
        if guard.is_none() {
            tracing::info!(model = self.name, "Loading model");
            *guard = Some((self.loader)()?);
            tracing::info!(model = self.name, "Model loaded");
        }
        self.map(guard)
    }

    /// Run `f` with exclusive access to the model on the blocking pool.
    pub async fn run<R, F>(&self, f: F) -> Result<R, InferenceError>
    where
        R: Send + 'static,
        F: FnOnce(&mut M) -> Result<R, InferenceError> + Send + 'static,
    {
        let slot = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut model = slot.acquire_blocking()?;
            f(&mut model)
        })
        .await?
    }

    fn map(&self, guard: OwnedMutexGuard<Option<M>>) -> Result<ModelGuard<M>, InferenceError> {
        OwnedMutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| {
            InferenceError::ModelUnavailable(format!("{} is not loaded", self.name))
        })
    }
}
