//! Product repository port, its HTTP adapter and the use cases the UI depends on.

use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::{format_date, parse_calendar_date, NormalizedError, Product, RawFailure};
use catalog_transport::ApiClient;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "catalog-products";

pub const PRODUCTS_PATH: &str = "/products";

/// Wire shape of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProduct {
    pub id: String,
    pub name: String,
    pub description: String,
    pub logo: String,
    pub date_release: String,
    pub date_revision: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGetAllResponse {
    pub data: Vec<ApiProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMutationResponse {
    #[serde(default)]
    pub message: String,
    pub data: ApiProduct,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("product {id}: invalid {field} {value:?}")]
    InvalidDate {
        id: String,
        field: &'static str,
        value: String,
    },
}

pub struct ProductMapper;

impl ProductMapper {
    pub fn to_domain(api: ApiProduct) -> Result<Product, MappingError> {
        let date_release = Self::parse_date(&api.id, "date_release", &api.date_release)?;
        let date_revision = Self::parse_date(&api.id, "date_revision", &api.date_revision)?;
        Ok(Product {
            id: api.id,
            name: api.name,
            description: api.description,
            logo: api.logo,
            date_release,
            date_revision,
        })
    }

    pub fn to_api(product: &Product) -> ApiProduct {
        ApiProduct {
            id: product.id.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            logo: product.logo.clone(),
            date_release: format_date(product.date_release),
            date_revision: format_date(product.date_revision),
        }
    }

    fn parse_date(id: &str, field: &'static str, value: &str) -> Result<chrono::NaiveDate, MappingError> {
        parse_calendar_date(value).ok_or_else(|| MappingError::InvalidDate {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
    }
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Product>, NormalizedError>;
    async fn get_by_id(&self, id: &str) -> Result<Product, NormalizedError>;
    /// `true` when the identifier is already taken.
    async fn verify_identifier(&self, id: &str) -> Result<bool, NormalizedError>;
    async fn create(&self, product: &Product) -> Result<Product, NormalizedError>;
    async fn update(&self, product: &Product) -> Result<Product, NormalizedError>;
    async fn remove(&self, id: &str) -> Result<(), NormalizedError>;
}

/// REST adapter for [`ProductRepository`].
#[derive(Debug, Clone)]
pub struct HttpProductRepository {
    http: ApiClient,
}

impl HttpProductRepository {
    pub fn new(http: ApiClient) -> Self {
        Self { http }
    }

    fn item_path(id: &str) -> String {
        format!("{PRODUCTS_PATH}/{}", urlencoding::encode(id))
    }

    fn map_product(&self, api: ApiProduct) -> Result<Product, NormalizedError> {
        ProductMapper::to_domain(api).map_err(|err| self.http.reject(RawFailure::Other(err.to_string())))
    }
}

#[async_trait]
impl ProductRepository for HttpProductRepository {
    async fn get_all(&self) -> Result<Vec<Product>, NormalizedError> {
        let resp: ApiGetAllResponse = self.http.get(PRODUCTS_PATH, None, None).await?;
        debug!(count = resp.data.len(), "products fetched");
        resp.data.into_iter().map(|p| self.map_product(p)).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Product, NormalizedError> {
        let api: ApiProduct = self.http.get(&Self::item_path(id), None, None).await?;
        self.map_product(api)
    }

    async fn verify_identifier(&self, id: &str) -> Result<bool, NormalizedError> {
        let path = format!("{PRODUCTS_PATH}/verification/{}", urlencoding::encode(id));
        self.http.get(&path, None, None).await
    }

    async fn create(&self, product: &Product) -> Result<Product, NormalizedError> {
        let payload = ProductMapper::to_api(product);
        let resp: ApiMutationResponse = self.http.post(PRODUCTS_PATH, &payload, None, None).await?;
        debug!(id = %product.id, message = %resp.message, "product created");
        self.map_product(resp.data)
    }

    async fn update(&self, product: &Product) -> Result<Product, NormalizedError> {
        let payload = ProductMapper::to_api(product);
        let resp: ApiMutationResponse = self
            .http
            .put(&Self::item_path(&product.id), &payload, None, None)
            .await?;
        debug!(id = %product.id, message = %resp.message, "product updated");
        self.map_product(resp.data)
    }

    async fn remove(&self, id: &str) -> Result<(), NormalizedError> {
        let _: IgnoredAny = self.http.delete(&Self::item_path(id), None, None).await?;
        debug!(%id, "product removed");
        Ok(())
    }
}

#[derive(Clone)]
pub struct GetProductsUseCase {
    repo: Arc<dyn ProductRepository>,
}

impl GetProductsUseCase {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self) -> Result<Vec<Product>, NormalizedError> {
        self.repo.get_all().await
    }
}

#[derive(Clone)]
pub struct GetProductUseCase {
    repo: Arc<dyn ProductRepository>,
}

impl GetProductUseCase {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, id: &str) -> Result<Product, NormalizedError> {
        self.repo.get_by_id(id).await
    }
}

#[derive(Clone)]
pub struct CreateProductUseCase {
    repo: Arc<dyn ProductRepository>,
}

impl CreateProductUseCase {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, product: &Product) -> Result<Product, NormalizedError> {
        self.repo.create(product).await
    }
}

#[derive(Clone)]
pub struct UpdateProductUseCase {
    repo: Arc<dyn ProductRepository>,
}

impl UpdateProductUseCase {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, product: &Product) -> Result<Product, NormalizedError> {
        self.repo.update(product).await
    }
}

#[derive(Clone)]
pub struct DeleteProductUseCase {
    repo: Arc<dyn ProductRepository>,
}

impl DeleteProductUseCase {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, id: &str) -> Result<(), NormalizedError> {
        self.repo.remove(id).await
    }
}

#[derive(Clone)]
pub struct VerifyIdentifierUseCase {
    repo: Arc<dyn ProductRepository>,
}

impl VerifyIdentifierUseCase {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, id: &str) -> Result<bool, NormalizedError> {
        self.repo.verify_identifier(id).await
    }
}

/// All product use cases wired against one repository.
#[derive(Clone)]
pub struct ProductUseCases {
    pub get_products: GetProductsUseCase,
    pub get_product: GetProductUseCase,
    pub create_product: CreateProductUseCase,
    pub update_product: UpdateProductUseCase,
    pub delete_product: DeleteProductUseCase,
    pub verify_identifier: VerifyIdentifierUseCase,
}

impl ProductUseCases {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self {
            get_products: GetProductsUseCase::new(repo.clone()),
            get_product: GetProductUseCase::new(repo.clone()),
            create_product: CreateProductUseCase::new(repo.clone()),
            update_product: UpdateProductUseCase::new(repo.clone()),
            delete_product: DeleteProductUseCase::new(repo.clone()),
            verify_identifier: VerifyIdentifierUseCase::new(repo),
        }
    }

    pub fn over_http(http: ApiClient) -> Self {
        Self::new(Arc::new(HttpProductRepository::new(http)))
    }
}
