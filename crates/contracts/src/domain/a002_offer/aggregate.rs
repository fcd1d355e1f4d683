use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::a001_product::{Product, ProductId};
use crate::domain::common::{AggregateRoot, EntityMetadata};

crate::uuid_aggregate_id!(
    /// Unique offer identifier
    OfferId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    #[default]
    Draft,
    Active,
    Inactive,
}

impl OfferStatus {
    pub fn code(&self) -> &'static str {
        match self {
            OfferStatus::Draft => "draft",
            OfferStatus::Active => "active",
            OfferStatus::Inactive => "inactive",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "draft" => Some(OfferStatus::Draft),
            "active" => Some(OfferStatus::Active),
            "inactive" => Some(OfferStatus::Inactive),
            _ => None,
        }
    }
}

/// Snapshot of a product as it was priced inside an offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferProduct {
    pub product_id: ProductId,
    pub name: String,
    pub base_price: i64,
    pub discounted_price: i64,
    pub discount_amount: i64,
    pub discount_percentage: f64,
}

impl OfferProduct {
    pub fn snapshot(product: &Product, discounted_price: i64) -> Self {
        let discount_amount = product.base_price - discounted_price;
        Self {
            product_id: product.id,
            name: product.name.clone(),
            base_price: product.base_price,
            discounted_price,
            discount_amount,
            discount_percentage: percentage(discount_amount, product.base_price),
        }
    }
}

/// A discounted bundle of specific products sold as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: OfferId,
    pub name: String,
    pub description: String,
    pub products: Vec<OfferProduct>,
    pub original_total: i64,
    pub discounted_total: i64,
    pub total_savings: i64,
    pub savings_percentage: f64,
    pub min_quantity: i32,
    pub max_quantity: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: OfferStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub metadata: EntityMetadata,
}

impl Offer {
    /// New draft offer from the form and the product snapshots built for it
    pub fn new_for_insert(
        dto: &OfferDto,
        products: Vec<OfferProduct>,
        created_by: Option<String>,
    ) -> Self {
        let mut offer = Self {
            id: OfferId::new_v4(),
            name: String::new(),
            description: String::new(),
            products: Vec::new(),
            original_total: 0,
            discounted_total: 0,
            total_savings: 0,
            savings_percentage: 0.0,
            min_quantity: 1,
            max_quantity: 1,
            valid_from: None,
            valid_until: None,
            status: OfferStatus::Draft,
            published_at: None,
            created_by,
            metadata: EntityMetadata::new(),
        };
        offer.update(dto, products);
        offer
    }

    pub fn update(&mut self, dto: &OfferDto, products: Vec<OfferProduct>) {
        self.name = dto.name.trim().to_string();
        self.description = dto.description.clone();
        self.products = products;
        self.min_quantity = dto.min_quantity.unwrap_or(1);
        self.max_quantity = dto.max_quantity.unwrap_or(10);
        self.valid_from = dto.valid_from;
        self.valid_until = dto.valid_until;
        self.recalculate_totals();
    }

    pub fn recalculate_totals(&mut self) {
        self.original_total = self.products.iter().map(|p| p.base_price).sum();
        self.discounted_total = self.products.iter().map(|p| p.discounted_price).sum();
        self.total_savings = self.original_total - self.discounted_total;
        self.savings_percentage = percentage(self.total_savings, self.original_total);
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Offer name cannot be empty".into());
        }
        if self.products.is_empty() {
            return Err("Offer must contain at least one product".into());
        }
        for p in &self.products {
            if p.discounted_price < 0 {
                return Err(format!("Discounted price of '{}' cannot be negative", p.name));
            }
            if p.discounted_price > p.base_price {
                return Err(format!(
                    "Discounted price of '{}' exceeds its base price",
                    p.name
                ));
            }
        }
        if self.discounted_total > self.original_total {
            return Err("Discounted total cannot exceed original total".into());
        }
        if self.min_quantity < 1 {
            return Err("Minimum quantity must be at least 1".into());
        }
        if self.max_quantity < self.min_quantity {
            return Err("Maximum quantity cannot be below minimum quantity".into());
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if from > until {
                return Err("Offer validity window ends before it starts".into());
            }
        }
        Ok(())
    }

    /// Active and inside its validity window at `now`
    pub fn is_purchasable(&self, now: DateTime<Utc>) -> bool {
        if self.status != OfferStatus::Active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        true
    }

    pub fn accepts_quantity(&self, quantity: i32) -> bool {
        quantity >= self.min_quantity && quantity <= self.max_quantity
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<(), String> {
        self.validate()?;
        if self.status == OfferStatus::Active {
            return Err("Offer is already published".into());
        }
        self.status = OfferStatus::Active;
        self.published_at = Some(now);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.status = OfferStatus::Inactive;
    }
}

impl AggregateRoot for Offer {
    type Id = OfferId;

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
        "Offer"
    }
}

/// Percentage of `part` in `whole`, rounded to two decimals
fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferProductInput {
    pub product_id: ProductId,
    pub discounted_price: i64,
}

/// Create/update form for an offer
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OfferDto {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub products: Vec<OfferProductInput>,
    pub min_quantity: Option<i32>,
    pub max_quantity: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}
