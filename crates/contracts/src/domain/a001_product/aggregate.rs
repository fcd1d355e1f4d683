use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::common::{AggregateRoot, EntityMetadata};

crate::uuid_aggregate_id!(
    /// Unique product identifier
    ProductId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

impl ProductStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "active" => Some(ProductStatus::Active),
            "inactive" => Some(ProductStatus::Inactive),
            _ => None,
        }
    }
}

/// A catalog item sold on its own or bundled into offers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Price in cents
    pub base_price: i64,
    pub category: String,
    pub tags: BTreeSet<String>,
    pub min_quantity: i32,
    pub max_quantity: i32,
    pub in_stock: bool,
    pub status: ProductStatus,
    pub image_url: Option<String>,
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub metadata: EntityMetadata,
}

impl Product {
    pub fn new_for_insert(dto: &ProductDto, created_by: Option<String>) -> Self {
        let mut product = Self {
            id: ProductId::new_v4(),
            name: String::new(),
            description: String::new(),
            base_price: 0,
            category: String::new(),
            tags: BTreeSet::new(),
            min_quantity: 1,
            max_quantity: 1,
            in_stock: true,
            status: ProductStatus::Active,
            image_url: None,
            created_by,
            metadata: EntityMetadata::new(),
        };
        product.update(dto);
        product
    }

    /// Copy editable fields from the form
    pub fn update(&mut self, dto: &ProductDto) {
        self.name = dto.name.trim().to_string();
        self.description = dto.description.clone();
        self.base_price = dto.base_price;
        self.category = dto.category.trim().to_string();
        self.tags = dto
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.min_quantity = dto.min_quantity.unwrap_or(1);
        self.max_quantity = dto.max_quantity.unwrap_or(99);
        self.in_stock = dto.in_stock;
        self.status = dto.status;
        self.image_url = dto.image_url.clone().filter(|u| !u.trim().is_empty());
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Product name cannot be empty".into());
        }
        if self.base_price < 0 {
            return Err("Base price cannot be negative".into());
        }
        if self.min_quantity < 1 {
            return Err("Minimum quantity must be at least 1".into());
        }
        if self.max_quantity < self.min_quantity {
            return Err("Maximum quantity cannot be below minimum quantity".into());
        }
        Ok(())
    }

    /// Whether customers can put this product into a cart
    pub fn is_orderable(&self) -> bool {
        self.status == ProductStatus::Active && self.in_stock
    }

    pub fn accepts_quantity(&self, quantity: i32) -> bool {
        quantity >= self.min_quantity && quantity <= self.max_quantity
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut EntityMetadata {
        &mut self.metadata
    }

    fn element_name() -> &'static str {
        "Product"
    }
}

/// Create/update form for a product
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_price: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub min_quantity: Option<i32>,
    pub max_quantity: Option<i32>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub status: ProductStatus,
    pub image_url: Option<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto() -> ProductDto {
        ProductDto {
            name: " Whole Milk 1L ".into(),
            base_price: 189,
            category: "dairy".into(),
            tags: vec!["Fresh".into(), "fresh".into(), " ".into()],
            min_quantity: Some(1),
            max_quantity: Some(12),
            in_stock: true,
            ..Default::default()
        }
    }

    #[test]
    fn new_product_normalizes_form_fields() {
        let product = Product::new_for_insert(&dto(), Some("admin".into()));
        assert_eq!(product.name, "Whole Milk 1L");
        assert_eq!(product.tags.len(), 1);
        assert!(product.tags.contains("fresh"));
        assert!(product.validate().is_ok());
        assert!(product.is_orderable());
    }

    #[test]
    fn validate_rejects_inverted_quantity_bounds() {
        let mut form = dto();
        form.min_quantity = Some(5);
        form.max_quantity = Some(2);
        let product = Product::new_for_insert(&form, None);
        assert!(product.validate().is_err());
    }

    #[test]
    fn out_of_stock_products_are_not_orderable() {
        let mut form = dto();
        form.in_stock = false;
        let product = Product::new_for_insert(&form, None);
        assert!(!product.is_orderable());
        assert!(product.accepts_quantity(12));
        assert!(!product.accepts_quantity(13));
    }
}
