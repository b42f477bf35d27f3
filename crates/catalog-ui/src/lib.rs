//! Headless view-state controllers for the product screens.
//!
//! Presentational layers render the view-models exposed here and feed user
//! intents back in; everything stateful lives in [`list`] and [`form`].

use std::fmt;
use std::sync::Mutex;

use catalog_core::ProductId;
use catalog_notify::NotificationService;
use chrono::NaiveDate;
use tracing::error;

pub mod form;
pub mod list;

#[cfg(test)]
mod test_support;

pub const CRATE_NAME: &str = "catalog-ui";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ProductList,
    NewProduct,
    EditProduct(ProductId),
}

impl Route {
    /// Router commands for this route.
    pub fn segments(&self) -> Vec<String> {
        match self {
            Self::ProductList => vec!["/products".to_string()],
            Self::NewProduct => vec!["/products/new".to_string()],
            Self::EditProduct(id) => vec!["/products".to_string(), id.clone(), "edit".to_string()],
        }
    }
}

/// Navigation boundary: changes the displayed route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, segments: &[String]);
}

pub(crate) fn go(navigator: &dyn Navigator, route: &Route) {
    navigator.navigate(&route.segments());
}

/// Navigator that only remembers what it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn history(&self) -> Vec<Vec<String>> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.history().pop()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, segments: &[String]) {
        if let Ok(mut history) = self.history.lock() {
            history.push(segments.to_vec());
        }
    }
}

/// Source of "today" for date validation.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar day of the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Last-resort handler for failures nothing else reported.
#[derive(Debug, Clone)]
pub struct UnexpectedErrorHandler {
    notifications: NotificationService,
}

impl UnexpectedErrorHandler {
    pub const TITLE: &'static str = "Unexpected error";
    pub const DETAIL: &'static str = "Something went wrong. Please try again.";

    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }

    pub fn handle(&self, err: &dyn fmt::Display) {
        error!(error = %err, "unexpected error");
        self.notifications
            .error(Self::TITLE, Some(Self::DETAIL.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_map_to_router_segments() {
        assert_eq!(Route::ProductList.segments(), vec!["/products"]);
        assert_eq!(Route::NewProduct.segments(), vec!["/products/new"]);
        assert_eq!(
            Route::EditProduct("p1".into()).segments(),
            vec!["/products", "p1", "edit"]
        );
    }

    #[test]
    fn recording_navigator_keeps_history() {
        let nav = RecordingNavigator::default();
        go(&nav, &Route::NewProduct);
        go(&nav, &Route::ProductList);
        assert_eq!(nav.history().len(), 2);
        assert_eq!(nav.last(), Some(vec!["/products".to_string()]));
    }

    #[tokio::test]
    async fn unexpected_errors_show_one_generic_notification() {
        let notifications = NotificationService::default();
        let handler = UnexpectedErrorHandler::new(notifications.clone());
        handler.handle(&"disk on fire");

        let queue = notifications.snapshot();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].title, UnexpectedErrorHandler::TITLE);
        assert_eq!(queue[0].detail.as_deref(), Some(UnexpectedErrorHandler::DETAIL));
    }
}
