use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{ErrorCode, NormalizedError, Product};
use catalog_products::{ProductRepository, ProductUseCases};
use chrono::NaiveDate;

pub(crate) fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

pub(crate) fn product(id: &str, name: &str, description: &str) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        logo: format!("https://example.com/{id}.png"),
        date_release: date("2025-01-01"),
        date_revision: date("2026-01-01"),
    }
}

pub(crate) fn fixture() -> Vec<Product> {
    vec![
        product("p1", "Laptop", "Gaming"),
        product("p2", "Mouse", "Wireless"),
        product("p3", "Keyboard", "Mechanical"),
    ]
}

pub(crate) fn server_error() -> NormalizedError {
    NormalizedError {
        code: ErrorCode::Server,
        message: "Server error.".into(),
        detail: None,
        status: Some(500),
    }
}

/// In-memory repository recording every call.
#[derive(Default)]
pub(crate) struct FakeRepository {
    pub products: Mutex<Vec<Product>>,
    pub taken_ids: Mutex<Vec<String>>,
    pub failure: Mutex<Option<NormalizedError>>,
    pub delay: Mutex<Option<Duration>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRepository {
    pub fn with_products(products: Vec<Product>) -> Arc<Self> {
        let repo = Self::default();
        *repo.products.lock().unwrap() = products;
        Arc::new(repo)
    }

    pub fn fail_with(&self, err: NormalizedError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    async fn enter(&self, call: String) -> Result<(), NormalizedError> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn use_cases(self: &Arc<Self>) -> ProductUseCases {
        ProductUseCases::new(self.clone())
    }
}

#[async_trait]
impl ProductRepository for FakeRepository {
    async fn get_all(&self) -> Result<Vec<Product>, NormalizedError> {
        self.enter("get_all".into()).await?;
        Ok(self.products.lock().unwrap().clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Product, NormalizedError> {
        self.enter(format!("get_by_id:{id}")).await?;
        self.products
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(NormalizedError {
                code: ErrorCode::NotFound,
                message: "Not found.".into(),
                detail: None,
                status: Some(404),
            })
    }

    async fn verify_identifier(&self, id: &str) -> Result<bool, NormalizedError> {
        self.enter(format!("verify:{id}")).await?;
        Ok(self.taken_ids.lock().unwrap().iter().any(|t| t == id))
    }

    async fn create(&self, product: &Product) -> Result<Product, NormalizedError> {
        self.enter(format!("create:{}", product.id)).await?;
        self.products.lock().unwrap().push(product.clone());
        Ok(product.clone())
    }

    async fn update(&self, product: &Product) -> Result<Product, NormalizedError> {
        self.enter(format!("update:{}", product.id)).await?;
        let mut products = self.products.lock().unwrap();
        if let Some(existing) = products.iter_mut().find(|p| p.id == product.id) {
            *existing = product.clone();
        }
        Ok(product.clone())
    }

    async fn remove(&self, id: &str) -> Result<(), NormalizedError> {
        self.enter(format!("remove:{id}")).await?;
        self.products.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }
}
