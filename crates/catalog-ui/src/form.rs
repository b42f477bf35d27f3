//! Create/edit form for a single product.
//!
//! Field values are kept as raw strings exactly as typed. Validation is
//! recomputed from those strings on demand; the only stored verdict is the
//! asynchronous identifier check, which is keyed by the value it checked.

use std::sync::Arc;
use std::time::Duration;

use catalog_core::{
    format_date, is_valid_url, parse_calendar_date, revision_date_for, NormalizedError, Product,
    ProductId,
};
use catalog_notify::NotificationService;
use catalog_products::{
    CreateProductUseCase, GetProductUseCase, ProductUseCases, UpdateProductUseCase,
    VerifyIdentifierUseCase,
};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{go, Clock, Navigator, Route, SystemClock};

pub const DEFAULT_UNIQUENESS_DEBOUNCE: Duration = Duration::from_millis(200);

pub const CREATED_TITLE: &str = "Product created";
pub const UPDATED_TITLE: &str = "Product updated";
pub const INVALID_FORM_TITLE: &str = "Check the form";
pub const INVALID_FORM_DETAIL: &str = "Some fields are invalid or incomplete.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    Id,
    Name,
    Description,
    Logo,
    DateRelease,
    DateRevision,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::Id,
        FormField::Name,
        FormField::Description,
        FormField::Logo,
        FormField::DateRelease,
        FormField::DateRevision,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Description => "description",
            Self::Logo => "logo",
            Self::DateRelease => "dateRelease",
            Self::DateRevision => "dateRevision",
        }
    }

    /// Inclusive character-length bounds for free-text fields.
    fn length_bounds(self) -> Option<(usize, usize)> {
        match self {
            Self::Id => Some((3, 50)),
            Self::Name => Some((3, 120)),
            Self::Description => Some((5, 500)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    Required,
    MinLength { min: usize, actual: usize },
    MaxLength { max: usize, actual: usize },
    Url,
    InvalidDate,
    MinToday,
    Duplicate,
}

impl ValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Required => "This field is required.",
            Self::MinLength { .. } => "Minimum length not reached.",
            Self::MaxLength { .. } => "Maximum length exceeded.",
            Self::Url => "Must be a valid URL.",
            Self::MinToday => "Release date cannot be earlier than today.",
            Self::Duplicate => "The identifier already exists.",
            Self::InvalidDate => "Invalid field.",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldState {
    pub value: String,
    pub touched: bool,
    pub dirty: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(ProductId),
}

impl FormMode {
    /// Edit mode exactly when the route carries a non-blank identifier.
    pub fn from_route_id(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Edit(id.to_string()),
            _ => Self::Create,
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Edit(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FormConfig {
    pub uniqueness_debounce: Duration,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            uniqueness_debounce: DEFAULT_UNIQUENESS_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation failed; nothing was sent.
    Invalid,
    Saved(Product),
    /// The use case failed; the interceptor has already notified.
    Failed(NormalizedError),
    Cancelled,
}

struct PendingCheck {
    value: String,
    result: oneshot::Receiver<bool>,
    task: JoinHandle<()>,
}

pub struct ProductFormController {
    get_product: GetProductUseCase,
    create_product: CreateProductUseCase,
    update_product: UpdateProductUseCase,
    verify_identifier: VerifyIdentifierUseCase,
    notifications: NotificationService,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    config: FormConfig,
    cancel: CancellationToken,

    mode: FormMode,
    fields: [FieldState; 6],
    loading: bool,
    pending_check: Option<PendingCheck>,
    last_checked: Option<String>,
    /// Identifier the backend reported as taken.
    duplicate_id: Option<String>,
}

impl ProductFormController {
    pub fn new(
        mode: FormMode,
        use_cases: &ProductUseCases,
        notifications: NotificationService,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let mut fields: [FieldState; 6] = Default::default();
        fields[FormField::DateRevision.index()].disabled = true;
        if let FormMode::Edit(id) = &mode {
            let field = &mut fields[FormField::Id.index()];
            field.value = id.clone();
            field.disabled = true;
        }

        Self {
            get_product: use_cases.get_product.clone(),
            create_product: use_cases.create_product.clone(),
            update_product: use_cases.update_product.clone(),
            verify_identifier: use_cases.verify_identifier.clone(),
            notifications,
            navigator,
            clock: Arc::new(SystemClock),
            config: FormConfig::default(),
            cancel: CancellationToken::new(),
            mode,
            fields,
            loading: false,
            pending_check: None,
            last_checked: None,
            duplicate_id: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn is_edit(&self) -> bool {
        self.mode.is_edit()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn field(&self, field: FormField) -> &FieldState {
        &self.fields[field.index()]
    }

    pub fn value(&self, field: FormField) -> &str {
        &self.field(field).value
    }

    pub fn is_dirty(&self) -> bool {
        self.fields.iter().any(|f| f.dirty)
    }

    /// An identifier check has been started and its result not yet applied.
    pub fn validation_pending(&self) -> bool {
        self.pending_check.is_some()
    }

    /// Lower bound for the release date picker.
    pub fn today_min(&self) -> String {
        format_date(self.clock.today())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn destroy(&mut self) {
        self.cancel.cancel();
        self.abort_check();
    }

    /// Load the product being edited. A no-op in create mode.
    ///
    /// Failures were already reported by the interceptor; the form stays
    /// empty. Returns `Ok(())` without touching state once destroyed.
    pub async fn init(&mut self) -> Result<(), NormalizedError> {
        let FormMode::Edit(id) = self.mode.clone() else {
            return Ok(());
        };
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        self.loading = true;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            result = self.get_product.execute(&id) => result,
        };
        self.loading = false;

        let product = result.inspect_err(|err| {
            debug!(%id, code = %err.code, "prefill failed");
        })?;

        // Stored revision date is shown as loaded, not re-derived.
        self.fill(FormField::Id, product.id);
        self.fill(FormField::Name, product.name);
        self.fill(FormField::Description, product.description);
        self.fill(FormField::Logo, product.logo);
        self.fill(FormField::DateRelease, format_date(product.date_release));
        self.fill(FormField::DateRevision, format_date(product.date_revision));
        info!(%id, "form prefilled");
        Ok(())
    }

    /// User input. Ignored for disabled fields.
    pub fn set_value(&mut self, field: FormField, value: impl Into<String>) {
        let state = &mut self.fields[field.index()];
        if state.disabled {
            debug!(field = field.as_str(), "ignoring input on disabled field");
            return;
        }
        state.value = value.into();
        state.dirty = true;

        if field == FormField::DateRelease {
            let revision = parse_calendar_date(&self.fields[field.index()].value)
                .and_then(revision_date_for)
                .map(format_date)
                .unwrap_or_default();
            self.fill(FormField::DateRevision, revision);
        }
    }

    /// Focus left `field`. Leaving the identifier starts the uniqueness check.
    pub fn blur(&mut self, field: FormField) {
        self.fields[field.index()].touched = true;
        if field == FormField::Id {
            self.schedule_uniqueness_check();
        }
    }

    pub fn errors(&self, field: FormField) -> Vec<ValidationError> {
        let state = self.field(field);
        if state.disabled {
            return Vec::new();
        }
        let mut errors = self.sync_errors(field);
        if field == FormField::Id
            && errors.is_empty()
            && self.duplicate_id.as_deref() == Some(state.value.trim())
        {
            errors.push(ValidationError::Duplicate);
        }
        errors
    }

    /// First message for a touched, invalid field.
    pub fn field_error(&self, field: FormField) -> Option<&'static str> {
        if !self.field(field).touched {
            return None;
        }
        self.errors(field).first().map(ValidationError::message)
    }

    pub fn is_valid(&self) -> bool {
        FormField::ALL.iter().all(|f| self.errors(*f).is_empty())
    }

    /// Apply a finished identifier check without waiting.
    pub fn refresh_validation(&mut self) {
        let Some(pending) = self.pending_check.as_mut() else {
            return;
        };
        match pending.result.try_recv() {
            Ok(exists) => {
                if let Some(pending) = self.pending_check.take() {
                    self.apply_check(&pending.value, exists);
                }
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => self.pending_check = None,
        }
    }

    /// Wait for any identifier check in flight and apply its result.
    pub async fn settle_validation(&mut self) {
        let Some(mut pending) = self.pending_check.take() else {
            return;
        };
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                pending.task.abort();
                return;
            }
            outcome = &mut pending.result => outcome,
        };
        if let Ok(exists) = outcome {
            self.apply_check(&pending.value, exists);
        }
    }

    pub async fn submit(&mut self) -> SubmitOutcome {
        if self.cancel.is_cancelled() {
            return SubmitOutcome::Cancelled;
        }
        self.settle_validation().await;
        if self.cancel.is_cancelled() {
            return SubmitOutcome::Cancelled;
        }

        let product = match self.is_valid().then(|| self.to_product()).flatten() {
            Some(product) => product,
            None => {
                for field in &mut self.fields {
                    field.touched = true;
                }
                self.notifications
                    .error(INVALID_FORM_TITLE, Some(INVALID_FORM_DETAIL.to_string()));
                return SubmitOutcome::Invalid;
            }
        };

        self.loading = true;
        let editing = self.is_edit();
        let (create, update) = (&self.create_product, &self.update_product);
        let save = async {
            if editing {
                update.execute(&product).await
            } else {
                create.execute(&product).await
            }
        };
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(id = %product.id, "submission abandoned");
                return SubmitOutcome::Cancelled;
            }
            result = save => result,
        };
        self.loading = false;

        match result {
            Ok(saved) => {
                info!(id = %saved.id, editing, "product saved");
                let title = if editing { UPDATED_TITLE } else { CREATED_TITLE };
                self.notifications.success(title, None);
                go(self.navigator.as_ref(), &Route::ProductList);
                SubmitOutcome::Saved(saved)
            }
            Err(err) => {
                debug!(id = %product.id, code = %err.code, "save failed");
                SubmitOutcome::Failed(err)
            }
        }
    }

    /// Back to empty, untouched values. Disabled fields stay disabled.
    pub fn reset(&mut self) {
        self.abort_check();
        self.last_checked = None;
        self.duplicate_id = None;
        for field in &mut self.fields {
            *field = FieldState {
                disabled: field.disabled,
                ..FieldState::default()
            };
        }
    }

    pub fn cancel(&self) {
        go(self.navigator.as_ref(), &Route::ProductList);
    }

    fn fill(&mut self, field: FormField, value: String) {
        self.fields[field.index()].value = value;
    }

    fn sync_errors(&self, field: FormField) -> Vec<ValidationError> {
        let value = self.value(field);
        if value.is_empty() {
            return vec![ValidationError::Required];
        }

        let mut errors = Vec::new();
        if let Some((min, max)) = field.length_bounds() {
            let actual = value.chars().count();
            if actual < min {
                errors.push(ValidationError::MinLength { min, actual });
            }
            if actual > max {
                errors.push(ValidationError::MaxLength { max, actual });
            }
        }

        match field {
            FormField::Logo if !is_valid_url(value) => errors.push(ValidationError::Url),
            FormField::DateRelease => match parse_calendar_date(value) {
                None => errors.push(ValidationError::InvalidDate),
                Some(date) if !self.is_edit() && date < self.clock.today() => {
                    errors.push(ValidationError::MinToday)
                }
                Some(_) => {}
            },
            FormField::DateRevision if parse_calendar_date(value).is_none() => {
                errors.push(ValidationError::InvalidDate)
            }
            _ => {}
        }
        errors
    }

    fn schedule_uniqueness_check(&mut self) {
        if self.is_edit() || self.field(FormField::Id).disabled {
            return;
        }
        let value = self.value(FormField::Id).trim().to_string();
        if value.is_empty() || !self.sync_errors(FormField::Id).is_empty() {
            return;
        }
        if self.last_checked.as_deref() == Some(value.as_str()) {
            debug!(id = %value, "identifier unchanged since last check");
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!(id = %value, "no async runtime; skipping identifier check");
            return;
        }

        self.abort_check();
        let (tx, rx) = oneshot::channel();
        let verify = self.verify_identifier.clone();
        let debounce = self.config.uniqueness_debounce;
        let id = value.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let exists = match verify.execute(&id).await {
                Ok(exists) => exists,
                Err(err) => {
                    debug!(%id, code = %err.code, "identifier check failed; treating as free");
                    false
                }
            };
            let _ = tx.send(exists);
        });

        self.last_checked = Some(value.clone());
        self.pending_check = Some(PendingCheck {
            value,
            result: rx,
            task,
        });
    }

    fn apply_check(&mut self, checked: &str, exists: bool) {
        if self.value(FormField::Id).trim() != checked {
            debug!(id = %checked, "dropping stale identifier check");
            return;
        }
        if exists {
            self.duplicate_id = Some(checked.to_string());
        } else if self.duplicate_id.as_deref() == Some(checked) {
            self.duplicate_id = None;
        }
    }

    fn abort_check(&mut self) {
        if let Some(pending) = self.pending_check.take() {
            pending.task.abort();
            // A superseded value must be checkable again.
            if self.last_checked.as_deref() == Some(pending.value.as_str()) {
                self.last_checked = None;
            }
        }
    }

    fn to_product(&self) -> Option<Product> {
        let id = match &self.mode {
            FormMode::Edit(id) => id.clone(),
            FormMode::Create => self.value(FormField::Id).to_string(),
        };
        Some(Product {
            id,
            name: self.value(FormField::Name).to_string(),
            description: self.value(FormField::Description).to_string(),
            logo: self.value(FormField::Logo).to_string(),
            date_release: parse_calendar_date(self.value(FormField::DateRelease))?,
            date_revision: parse_calendar_date(self.value(FormField::DateRevision))?,
        })
    }
}

impl Drop for ProductFormController {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_check.take() {
            pending.task.abort();
        }
    }
}
