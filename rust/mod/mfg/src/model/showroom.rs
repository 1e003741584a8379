use serde::{Deserialize, Serialize};

use openerp_core::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowroomStatus {
    /// At least one unit on display.
    Available,
    /// Nothing on display, units still out for rework.
    InRework,
    /// Nothing on display or in rework.
    SoldOut,
}

impl ShowroomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InRework => "in_rework",
            Self::SoldOut => "sold_out",
        }
    }
}

/// Unit cost given to a batch when it is first created.
pub const DEFAULT_UNIT_COST: f64 = 100.0;
/// Default sale price as a multiple of unit cost.
pub const DEFAULT_MARKUP: f64 = 1.5;

/// Sellable inventory for one production order.
///
/// `display_quantity + rework_quantity + sold_quantity == original_quantity`
/// holds after every write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShowroomBatch {
    pub id: String,
    pub production_order_id: String,
    pub name: String,
    pub original_quantity: u32,
    pub display_quantity: u32,
    pub rework_quantity: u32,
    pub sold_quantity: u32,
    /// Per-unit prices quoted to sales.
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default)]
    pub sale_price: f64,
    pub showroom_status: ShowroomStatus,
    pub displayed_at: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

/// How one promotion changes a showroom batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionDelta {
    /// Passing units never counted before: display +1, original +1.
    pub new_display: u32,
    /// Units back from rework that passed: rework -1, display +1.
    pub returned: u32,
    /// Failed units handed to rework, never counted before: rework +1, original +1.
    pub new_rework: u32,
}

impl PromotionDelta {
    pub fn is_empty(&self) -> bool {
        self.new_display == 0 && self.returned == 0 && self.new_rework == 0
    }

    /// Units moving onto display in this promotion.
    pub fn passing(&self) -> u32 {
        self.new_display + self.returned
    }
}

fn overflow(batch: &ShowroomBatch) -> ServiceError {
    ServiceError::InvariantViolation(format!(
        "showroom batch {} quantity arithmetic overflowed",
        batch.id
    ))
}

impl ShowroomBatch {
    /// Check the quantity partition.
    pub fn check_invariant(&self) -> Result<(), ServiceError> {
        let accounted = self.display_quantity as u64
            + self.rework_quantity as u64
            + self.sold_quantity as u64;
        if accounted != self.original_quantity as u64 {
            return Err(ServiceError::InvariantViolation(format!(
                "showroom batch {}: display {} + rework {} + sold {} != original {}",
                self.id,
                self.display_quantity,
                self.rework_quantity,
                self.sold_quantity,
                self.original_quantity
            )));
        }
        Ok(())
    }

    pub fn refresh_status(&mut self) {
        self.showroom_status = if self.display_quantity > 0 {
            ShowroomStatus::Available
        } else if self.rework_quantity > 0 {
            ShowroomStatus::InRework
        } else {
            ShowroomStatus::SoldOut
        };
    }

    /// Merge a promotion into this batch. Fails closed: on error `self` is
    /// left unchanged.
    pub fn apply(&mut self, delta: &PromotionDelta) -> Result<(), ServiceError> {
        self.check_invariant()?;
        if delta.returned > self.rework_quantity {
            return Err(ServiceError::InvariantViolation(format!(
                "showroom batch {}: {} units returning from rework but only {} in rework",
                self.id, delta.returned, self.rework_quantity
            )));
        }

        let mut next = self.clone();
        next.rework_quantity = (next.rework_quantity - delta.returned)
            .checked_add(delta.new_rework)
            .ok_or_else(|| overflow(self))?;
        next.display_quantity = next
            .display_quantity
            .checked_add(delta.passing())
            .ok_or_else(|| overflow(self))?;
        next.original_quantity = next
            .original_quantity
            .checked_add(delta.new_display)
            .and_then(|q| q.checked_add(delta.new_rework))
            .ok_or_else(|| overflow(self))?;
        next.check_invariant()?;
        next.refresh_status();

        *self = next;
        Ok(())
    }

    /// Replace either unit price. Prices must be finite and non-negative.
    pub fn set_pricing(
        &mut self,
        cost_price: Option<f64>,
        sale_price: Option<f64>,
    ) -> Result<(), ServiceError> {
        for (field, price) in [("costPrice", cost_price), ("salePrice", sale_price)] {
            if let Some(p) = price {
                if !p.is_finite() || p < 0.0 {
                    return Err(ServiceError::Validation(format!(
                        "{field} must be a non-negative amount, got {p}"
                    )));
                }
            }
        }
        if let Some(p) = cost_price {
            self.cost_price = p;
        }
        if let Some(p) = sale_price {
            self.sale_price = p;
        }
        Ok(())
    }

    /// Move `quantity` units from display to sold.
    pub fn sell(&mut self, quantity: u32) -> Result<(), ServiceError> {
        if quantity == 0 {
            return Err(ServiceError::Validation("sale quantity must be positive".into()));
        }
        if quantity > self.display_quantity {
            return Err(ServiceError::Validation(format!(
                "showroom batch {} has {} units on display, cannot sell {}",
                self.id, self.display_quantity, quantity
            )));
        }
        self.check_invariant()?;
        self.display_quantity -= quantity;
        self.sold_quantity = self
            .sold_quantity
            .checked_add(quantity)
            .ok_or_else(|| overflow(self))?;
        self.check_invariant()?;
        self.refresh_status();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_batch() -> ShowroomBatch {
        ShowroomBatch {
            id: "sb1".into(),
            production_order_id: "po1".into(),
            name: "Tiller".into(),
            original_quantity: 0,
            display_quantity: 0,
            rework_quantity: 0,
            sold_quantity: 0,
            cost_price: DEFAULT_UNIT_COST,
            sale_price: DEFAULT_UNIT_COST * DEFAULT_MARKUP,
            showroom_status: ShowroomStatus::SoldOut,
            displayed_at: "t".into(),
            created_at: "t".into(),
            updated_at: "t".into(),
            version: 1,
        }
    }

    #[test]
    fn partial_pass_then_rework_return() {
        let mut b = empty_batch();
        b.apply(&PromotionDelta { new_display: 2, returned: 0, new_rework: 1 })
            .unwrap();
        assert_eq!(
            (b.original_quantity, b.display_quantity, b.rework_quantity),
            (3, 2, 1)
        );
        assert_eq!(b.showroom_status, ShowroomStatus::Available);

        b.apply(&PromotionDelta { new_display: 0, returned: 1, new_rework: 0 })
            .unwrap();
        assert_eq!(
            (b.original_quantity, b.display_quantity, b.rework_quantity),
            (3, 3, 0)
        );
    }

    #[test]
    fn returning_more_than_in_rework_fails_closed() {
        let mut b = empty_batch();
        b.apply(&PromotionDelta { new_display: 1, returned: 0, new_rework: 0 })
            .unwrap();
        let before = b.clone();
        let err = b
            .apply(&PromotionDelta { new_display: 0, returned: 1, new_rework: 0 })
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvariantViolation(_)));
        assert_eq!(b, before);
    }

    #[test]
    fn corrupted_batch_is_never_adjusted() {
        let mut b = empty_batch();
        b.original_quantity = 5;
        b.display_quantity = 3;
        let err = b
            .apply(&PromotionDelta { new_display: 1, returned: 0, new_rework: 0 })
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvariantViolation(_)));
        assert_eq!(b.display_quantity, 3);
    }

    #[test]
    fn selling_moves_display_to_sold() {
        let mut b = empty_batch();
        b.apply(&PromotionDelta { new_display: 2, returned: 0, new_rework: 0 })
            .unwrap();
        b.sell(2).unwrap();
        assert_eq!((b.display_quantity, b.sold_quantity), (0, 2));
        assert_eq!(b.showroom_status, ShowroomStatus::SoldOut);
        assert!(matches!(b.sell(1), Err(ServiceError::Validation(_))));
        assert!(matches!(b.sell(0), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn pricing_rejects_negative_and_non_finite() {
        let mut b = empty_batch();
        b.set_pricing(None, Some(180.0)).unwrap();
        assert_eq!((b.cost_price, b.sale_price), (100.0, 180.0));

        assert!(matches!(b.set_pricing(Some(-1.0), None), Err(ServiceError::Validation(_))));
        assert!(matches!(b.set_pricing(None, Some(f64::NAN)), Err(ServiceError::Validation(_))));
        // A rejected change leaves both prices alone.
        assert!(b.set_pricing(Some(90.0), Some(f64::INFINITY)).is_err());
        assert_eq!((b.cost_price, b.sale_price), (100.0, 180.0));
    }

    #[test]
    fn all_in_rework_status() {
        let mut b = empty_batch();
        b.apply(&PromotionDelta { new_display: 0, returned: 0, new_rework: 2 })
            .unwrap();
        assert_eq!(b.showroom_status, ShowroomStatus::InRework);
        b.check_invariant().unwrap();
    }
}
