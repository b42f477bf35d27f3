//! Product list screen: raw collection, search, paging and the delete flow.
//!
//! The view-model is a pure function of four inputs (collection, query, page,
//! page size). Out-of-range pages are clamped inside that same derivation and
//! written back once per input change, so there is no feedback loop.

use std::sync::Arc;

use catalog_core::{Product, ProductId};
use catalog_notify::NotificationService;
use catalog_products::{DeleteProductUseCase, GetProductsUseCase, ProductUseCases};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{go, Navigator, Route};

pub const PAGE_SIZE_OPTIONS: [usize; 3] = [5, 10, 20];
pub const DEFAULT_PAGE_SIZE: usize = 10;

pub const LOAD_FAILED_TITLE: &str = "Could not load products";
pub const DELETED_TITLE: &str = "Product deleted";
pub const DELETE_FAILED_TITLE: &str = "Could not delete product";

/// Everything the list view renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListVm {
    pub loading: bool,
    pub query: String,
    pub total: usize,
    pub products: Vec<Product>,
    pub page_size: usize,
    pub current_page: usize,
    pub total_pages: usize,
    /// 1-based first item shown; 0 when nothing matches.
    pub from: usize,
    /// 1-based last item shown; 0 when nothing matches.
    pub to: usize,
}

pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1)).max(1)
}

/// filter -> total -> total pages -> clamp page -> slice.
pub fn derive_view(
    products: &[Product],
    query: &str,
    page: usize,
    page_size: usize,
    loading: bool,
) -> ProductListVm {
    let needle = normalize_query(query);
    let filtered: Vec<&Product> = products.iter().filter(|p| p.matches(&needle)).collect();

    let page_size = page_size.max(1);
    let total = filtered.len();
    let total_pages = total_pages(total, page_size);
    let current_page = page.clamp(1, total_pages);
    let start = (current_page - 1) * page_size;
    let page_rows: Vec<Product> = filtered
        .into_iter()
        .skip(start)
        .take(page_size)
        .cloned()
        .collect();

    let (from, to) = if total == 0 {
        (0, 0)
    } else {
        (start + 1, start + page_rows.len())
    };

    ProductListVm {
        loading,
        query: query.to_string(),
        total,
        products: page_rows,
        page_size,
        current_page,
        total_pages,
        from,
        to,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteState {
    Idle,
    Confirming { id: ProductId, name: String },
    Deleting { id: ProductId, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing was pending confirmation.
    Skipped,
    Deleted,
    Failed,
    Cancelled,
}

pub struct ProductListController {
    get_products: GetProductsUseCase,
    delete_product: DeleteProductUseCase,
    notifications: NotificationService,
    navigator: Arc<dyn Navigator>,
    cancel: CancellationToken,

    loading: bool,
    products: Vec<Product>,
    query: String,
    page: usize,
    page_size: usize,
    delete: DeleteState,
}

impl ProductListController {
    pub fn new(
        use_cases: &ProductUseCases,
        notifications: NotificationService,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            get_products: use_cases.get_products.clone(),
            delete_product: use_cases.delete_product.clone(),
            notifications,
            navigator,
            cancel: CancellationToken::new(),
            loading: true,
            products: Vec::new(),
            query: String::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            delete: DeleteState::Idle,
        }
    }

    pub fn view(&self) -> ProductListVm {
        derive_view(&self.products, &self.query, self.page, self.page_size, self.loading)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn delete_state(&self) -> &DeleteState {
        &self.delete
    }

    pub fn confirm_open(&self) -> bool {
        !matches!(self.delete, DeleteState::Idle)
    }

    pub fn deleting(&self) -> bool {
        matches!(self.delete, DeleteState::Deleting { .. })
    }

    pub fn pending_delete_name(&self) -> &str {
        match &self.delete {
            DeleteState::Idle => "",
            DeleteState::Confirming { name, .. } | DeleteState::Deleting { name, .. } => name,
        }
    }

    /// Token cancelled by [`destroy`](Self::destroy); hosts may keep a clone.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tear down: in-flight work finishes without touching state.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    pub async fn load(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.loading = true;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("product load abandoned");
                return;
            }
            result = self.get_products.execute() => result,
        };

        match result {
            Ok(products) => {
                info!(count = products.len(), "products loaded");
                self.products = products;
            }
            Err(err) => {
                debug!(code = %err.code, "product load failed");
                self.notifications.error(LOAD_FAILED_TITLE, None);
                self.products.clear();
            }
        }
        self.loading = false;
        self.settle_page();
    }

    pub fn on_search(&mut self, value: impl Into<String>) {
        self.query = value.into();
        self.page = 1;
        self.settle_page();
    }

    /// Returns `false` (and changes nothing) for sizes outside [`PAGE_SIZE_OPTIONS`].
    pub fn on_page_size_change(&mut self, size: usize) -> bool {
        if !PAGE_SIZE_OPTIONS.contains(&size) {
            debug!(size, "ignoring page size outside the allow-list");
            return false;
        }
        self.page_size = size;
        self.page = 1;
        self.settle_page();
        true
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
        self.settle_page();
    }

    pub fn prev_page(&mut self) {
        self.set_page(self.page.saturating_sub(1).max(1));
    }

    pub fn next_page(&mut self) {
        self.set_page(self.page.saturating_add(1));
    }

    pub fn on_create(&self) {
        go(self.navigator.as_ref(), &Route::NewProduct);
    }

    pub fn on_edit(&self, id: &str) {
        go(self.navigator.as_ref(), &Route::EditProduct(id.to_string()));
    }

    /// Ask for confirmation; the dialog shows the product name, or the id
    /// when the product is not in the current collection.
    pub fn on_delete(&mut self, id: &str) {
        let name = self
            .products
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string());
        self.delete = DeleteState::Confirming {
            id: id.to_string(),
            name,
        };
    }

    pub fn close_confirm(&mut self) {
        self.delete = DeleteState::Idle;
    }

    pub async fn confirm_delete(&mut self) -> DeleteOutcome {
        let DeleteState::Confirming { id, name } = self.delete.clone() else {
            return DeleteOutcome::Skipped;
        };
        if self.cancel.is_cancelled() {
            return DeleteOutcome::Cancelled;
        }

        self.delete = DeleteState::Deleting {
            id: id.clone(),
            name: name.clone(),
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(%id, "delete abandoned");
                return DeleteOutcome::Cancelled;
            }
            result = self.delete_product.execute(&id) => result,
        };

        match result {
            Ok(()) => {
                info!(%id, "product deleted");
                self.notifications.success(DELETED_TITLE, None);
                self.products.retain(|p| p.id != id);
                self.close_confirm();
                self.settle_page();
                DeleteOutcome::Deleted
            }
            Err(err) => {
                debug!(%id, code = %err.code, "delete failed");
                self.delete = DeleteState::Confirming { id, name };
                self.notifications.error(DELETE_FAILED_TITLE, None);
                DeleteOutcome::Failed
            }
        }
    }

    /// Pull the requested page back into `[1, total_pages]`. Idempotent.
    fn settle_page(&mut self) {
        let current = self.view().current_page;
        if current != self.page {
            debug!(from = self.page, to = current, "page corrected");
            self.page = current;
        }
    }
}
