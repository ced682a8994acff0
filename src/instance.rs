//! Instance & lifecycle (§4.7): datafile storage, sticky/initial overrides, refresh
//! scheduling, and activation, wired together behind the public API surface in §6.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::bucket::{ConfigureBucketKey, ConfigureBucketValue};
use crate::emitter::{Emitter, Event, EventArgs};
use crate::error::{Error, Result};
use crate::evaluation::{self, EvaluationInputs, FlagEvaluation, Reason, VariableEvaluation, VariationEvaluation};
use crate::model::Datafile;
use crate::overrides::Overrides;
use crate::types::{AttributeValue, Context, OverrideTable};

/// Caller-supplied transport for fetching a datafile by URL. The HTTP client itself is
/// out of this crate's scope (§1); embedders provide the transport.
#[async_trait]
pub trait DatafileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Datafile, Box<dyn std::error::Error + Send + Sync>>;
}

/// Hook invoked once per evaluation to derive the context actually used for bucketing
/// (§4.6 step 5); forced-entry matching still uses the original context.
pub type InterceptContext = dyn Fn(&Context) -> Context + Send + Sync;

/// Construction and runtime options (§6).
pub struct Options {
    pub datafile: Option<Datafile>,
    pub datafile_url: Option<String>,
    pub fetcher: Option<Arc<dyn DatafileFetcher>>,
    pub bucket_key_separator: String,
    pub configure_bucket_key: Option<Arc<ConfigureBucketKey>>,
    pub configure_bucket_value: Option<Arc<ConfigureBucketValue>>,
    pub intercept_context: Option<Arc<InterceptContext>>,
    pub initial_features: OverrideTable,
    pub sticky_features: Option<OverrideTable>,
    pub refresh_interval: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            datafile: None,
            datafile_url: None,
            fetcher: None,
            bucket_key_separator: ".".to_string(),
            configure_bucket_key: None,
            configure_bucket_value: None,
            intercept_context: None,
            initial_features: OverrideTable::new(),
            sticky_features: None,
            refresh_interval: None,
        }
    }
}

struct Statuses {
    ready: AtomicBool,
    refresh_in_progress: AtomicBool,
}

/// A live evaluation engine instance: current datafile, override tables, emitter, and
/// (optionally) a running background refresher.
pub struct Instance {
    datafile: RwLock<Arc<Datafile>>,
    statuses: Statuses,
    sticky: RwLock<Overrides>,
    initial: Overrides,
    emitter: Emitter,
    bucket_key_separator: String,
    configure_bucket_key: Option<Arc<ConfigureBucketKey>>,
    configure_bucket_value: Option<Arc<ConfigureBucketValue>>,
    intercept_context: Option<Arc<InterceptContext>>,
    datafile_url: Option<String>,
    fetcher: Option<Arc<dyn DatafileFetcher>>,
    refresh_interval: Option<Duration>,
    refresh_task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Instance {
    /// Constructs a new instance. Fails with [`Error::MissingDatafileOptions`] if
    /// neither `datafile` nor `datafile_url` is supplied.
    pub async fn new(options: Options) -> Result<Arc<Self>> {
        if options.datafile.is_none() && options.datafile_url.is_none() {
            return Err(Error::MissingDatafileOptions);
        }

        let initial_datafile = options.datafile.clone().unwrap_or_else(Datafile::empty);
        let is_ready_immediately = options.datafile.is_some();

        let instance = Arc::new(Self {
            datafile: RwLock::new(Arc::new(initial_datafile)),
            statuses: Statuses {
                ready: AtomicBool::new(is_ready_immediately),
                refresh_in_progress: AtomicBool::new(false),
            },
            sticky: RwLock::new(Overrides::from(options.sticky_features.unwrap_or_default())),
            initial: Overrides::from(options.initial_features),
            emitter: Emitter::new(),
            bucket_key_separator: options.bucket_key_separator,
            configure_bucket_key: options.configure_bucket_key,
            configure_bucket_value: options.configure_bucket_value,
            intercept_context: options.intercept_context,
            datafile_url: options.datafile_url,
            fetcher: options.fetcher,
            refresh_interval: options.refresh_interval,
            refresh_task: AsyncMutex::new(None),
        });

        if is_ready_immediately {
            tracing::info!("instance constructed with inline datafile, ready immediately");
            instance.emitter.emit(Event::Ready, EventArgs::Ready);
            if instance.refresh_interval.is_some() {
                instance.clone().start_refreshing().await;
            }
        } else {
            match instance.fetch_datafile().await {
                Ok(datafile) => {
                    let revision = datafile.revision.clone();
                    *instance
                        .datafile
                        .write()
                        .unwrap_or_else(|p| p.into_inner()) = Arc::new(datafile);
                    instance.statuses.ready.store(true, Ordering::SeqCst);
                    tracing::info!(revision, "instance ready after initial fetch");
                    instance.emitter.emit(Event::Ready, EventArgs::Ready);
                    if instance.refresh_interval.is_some() {
                        instance.clone().start_refreshing().await;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "initial datafile fetch failed");
                }
            }
        }

        Ok(instance)
    }

    pub fn is_ready(&self) -> bool {
        self.statuses.ready.load(Ordering::SeqCst)
    }

    pub fn get_revision(&self) -> String {
        self.current_datafile().revision.clone()
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    fn current_datafile(&self) -> Arc<Datafile> {
        self.datafile
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Installs `datafile` directly, without going through the fetcher. Used for
    /// caller-driven `setDatafile` calls (e.g. pushed over a websocket).
    pub fn set_datafile(&self, datafile: Datafile) {
        for warning in datafile.structural_warnings() {
            tracing::warn!(warning, "datafile structural warning");
        }
        let revision = datafile.revision.clone();
        *self.datafile.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(datafile);
        self.statuses.ready.store(true, Ordering::SeqCst);
        tracing::info!(revision, "datafile installed");
    }

    /// Parses `json` as a datafile and installs it via [`Self::set_datafile`]. The
    /// previously installed datafile is retained on parse failure.
    pub fn set_datafile_json(&self, json: &str) -> Result<()> {
        let datafile: Datafile = serde_json::from_str(json)?;
        self.set_datafile(datafile);
        Ok(())
    }

    pub fn set_sticky_features(&self, table: Option<OverrideTable>) {
        let mut sticky = self.sticky.write().unwrap_or_else(|p| p.into_inner());
        *sticky = Overrides::from(table.unwrap_or_default());
    }

    async fn fetch_datafile(&self) -> Result<Datafile> {
        let url = self
            .datafile_url
            .as_ref()
            .ok_or_else(|| Error::InvalidUrl("no datafile_url configured".to_string()))?;
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| Error::InvalidUrl("no fetcher configured for datafile_url".to_string()))?;
        fetcher
            .fetch(url)
            .await
            .map_err(|source| Error::Fetch {
                url: url.clone(),
                source,
            })
    }

    /// Fetches and installs a fresh datafile. No-op (with a warn log) if a refresh is
    /// already in flight. Emits `refresh` always on success, and additionally `update`
    /// iff the revision changed.
    pub async fn refresh(self: &Arc<Self>) {
        if self.datafile_url.is_none() {
            tracing::warn!("refresh called with no datafile_url configured");
            return;
        }
        if self
            .statuses
            .refresh_in_progress
            .swap(true, Ordering::SeqCst)
        {
            tracing::warn!("refresh already in progress, skipping");
            return;
        }

        let previous_revision = self.get_revision();
        match self.fetch_datafile().await {
            Ok(datafile) => {
                let new_revision = datafile.revision.clone();
                for warning in datafile.structural_warnings() {
                    tracing::warn!(warning, "datafile structural warning");
                }
                *self.datafile.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(datafile);
                self.statuses.ready.store(true, Ordering::SeqCst);
                tracing::info!(revision = new_revision, "refresh complete");
                self.emitter.emit(
                    Event::Refresh,
                    EventArgs::Refresh {
                        revision: new_revision.clone(),
                    },
                );
                if new_revision != previous_revision {
                    self.emitter.emit(
                        Event::Update,
                        EventArgs::Update {
                            revision: new_revision,
                        },
                    );
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "refresh fetch failed");
            }
        }

        self.statuses
            .refresh_in_progress
            .store(false, Ordering::SeqCst);
    }

    /// Starts a background task that calls [`Self::refresh`] on `refresh_interval`.
    /// A no-op (with a warn log) if already running or if no interval is configured.
    pub async fn start_refreshing(self: Arc<Self>) {
        let interval = match self.refresh_interval {
            Some(d) => d,
            None => {
                tracing::warn!("start_refreshing called with no refresh_interval configured");
                return;
            }
        };

        let mut task_slot = self.refresh_task.lock().await;
        if task_slot.is_some() {
            tracing::warn!("start_refreshing called while already refreshing");
            return;
        }

        let instance = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it, initial fetch already ran
            loop {
                ticker.tick().await;
                instance.refresh().await;
            }
        });
        *task_slot = Some(handle);
    }

    /// Cancels the background refresh task, if running.
    pub async fn stop_refreshing(&self) {
        let mut task_slot = self.refresh_task.lock().await;
        if let Some(handle) = task_slot.take() {
            handle.abort();
        }
    }

    fn final_context(&self, context: &Context) -> Context {
        match &self.intercept_context {
            Some(hook) => hook(context),
            None => context.clone(),
        }
    }

    fn evaluation_inputs<'a>(&'a self, datafile: &'a Datafile, sticky: &'a Overrides) -> EvaluationInputs<'a> {
        EvaluationInputs {
            datafile,
            sticky,
            initial: &self.initial,
            is_ready: self.is_ready(),
            bucket_key_separator: &self.bucket_key_separator,
        }
    }

    pub fn evaluate_flag(&self, feature_key: &str, context: &Context) -> FlagEvaluation {
        let datafile = self.current_datafile();
        let sticky = self.sticky.read().unwrap_or_else(|p| p.into_inner());
        let final_context = self.final_context(context);
        let eval = evaluation::evaluate_flag(
            feature_key,
            context,
            &final_context,
            &self.evaluation_inputs(&datafile, &sticky),
        );
        tracing::debug!(feature_key, reason = ?eval.reason, enabled = eval.enabled, "flag evaluated");
        eval
    }

    pub fn is_enabled(&self, feature_key: &str, context: &Context) -> bool {
        self.evaluate_flag(feature_key, context).enabled
    }

    pub fn evaluate_variation(&self, feature_key: &str, context: &Context) -> VariationEvaluation {
        let datafile = self.current_datafile();
        let sticky = self.sticky.read().unwrap_or_else(|p| p.into_inner());
        let final_context = self.final_context(context);
        let eval = evaluation::evaluate_variation(
            feature_key,
            context,
            &final_context,
            &self.evaluation_inputs(&datafile, &sticky),
        );
        tracing::debug!(feature_key, reason = ?eval.reason, variation = ?eval.variation, "variation evaluated");
        eval
    }

    pub fn get_variation(&self, feature_key: &str, context: &Context) -> Option<String> {
        self.evaluate_variation(feature_key, context).variation
    }

    pub fn evaluate_variable(
        &self,
        feature_key: &str,
        variable_key: &str,
        context: &Context,
    ) -> VariableEvaluation {
        let datafile = self.current_datafile();
        let sticky = self.sticky.read().unwrap_or_else(|p| p.into_inner());
        let final_context = self.final_context(context);
        let eval = evaluation::evaluate_variable(
            feature_key,
            variable_key,
            context,
            &final_context,
            &self.evaluation_inputs(&datafile, &sticky),
        );
        tracing::debug!(feature_key, variable_key, reason = ?eval.reason, "variable evaluated");
        eval
    }

    pub fn get_variable(
        &self,
        feature_key: &str,
        variable_key: &str,
        context: &Context,
    ) -> Option<AttributeValue> {
        self.evaluate_variable(feature_key, variable_key, context).value
    }

    /// Resolves a variation and, if one is found, emits an `activation` event carrying
    /// the final (post-`interceptContext`) context, the captured context (attributes
    /// marked `capture: true` in the datafile), and the full evaluation (§4.7).
    pub fn activate(&self, feature_key: &str, context: &Context) -> Option<String> {
        let datafile = self.current_datafile();
        let sticky = self.sticky.read().unwrap_or_else(|p| p.into_inner());
        let final_context = self.final_context(context);
        let eval = evaluation::evaluate_variation(
            feature_key,
            context,
            &final_context,
            &self.evaluation_inputs(&datafile, &sticky),
        );
        tracing::debug!(feature_key, reason = ?eval.reason, variation = ?eval.variation, "variation evaluated");

        if eval.reason == Reason::Disabled || eval.reason == Reason::NotFound {
            return None;
        }
        if let Some(variation) = &eval.variation {
            let captured_context = captured_context(&datafile, &final_context);
            self.emitter.emit(
                Event::Activation,
                EventArgs::Activation {
                    feature_key: feature_key.to_string(),
                    variation: Some(variation.clone()),
                    final_context,
                    captured_context,
                    evaluation: eval.clone(),
                },
            );
        }
        eval.variation
    }
}

/// Builds the subset of `context` whose attribute key is declared `capture: true`
/// in the datafile (§4.7).
fn captured_context(datafile: &Datafile, context: &Context) -> Context {
    let mut captured = Context::new();
    for attribute in &datafile.attributes {
        if attribute.capture {
            if let Some(value) = context.get(&attribute.key) {
                captured.insert(attribute.key.clone(), value.clone());
            }
        }
    }
    captured
}
