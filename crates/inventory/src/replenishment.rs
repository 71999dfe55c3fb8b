use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, ItemId, WarehouseId};

/// Min/max replenishment settings for one item in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentRule {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    /// Reorder when on-hand falls to this level.
    pub safety_stock: i64,
    /// Target level after the order arrives.
    pub max_stock: i64,
    pub min_order_qty: i64,
    pub lead_time_days: u32,
}

impl ReplenishmentRule {
    pub fn validate(&self) -> DomainResult<()> {
        if self.safety_stock < 0 || self.max_stock < 0 || self.min_order_qty < 0 {
            return Err(DomainError::validation(
                "replenishment quantities cannot be negative",
            ));
        }
        if self.max_stock < self.safety_stock {
            return Err(DomainError::validation(
                "max stock must not be below safety stock",
            ));
        }
        Ok(())
    }

    pub fn needs_replenishment(&self, on_hand: i64) -> bool {
        on_hand <= self.safety_stock
    }

    /// Suggest an order when `on_hand` is at or below safety stock.
    pub fn evaluate(&self, on_hand: i64) -> Option<ReplenishmentSuggestion> {
        if !self.needs_replenishment(on_hand) {
            return None;
        }
        let order_quantity = (self.max_stock - on_hand).max(self.min_order_qty);
        if order_quantity <= 0 {
            return None;
        }
        Some(ReplenishmentSuggestion {
            item_id: self.item_id,
            warehouse_id: self.warehouse_id,
            on_hand,
            safety_stock: self.safety_stock,
            order_quantity,
            lead_time_days: self.lead_time_days,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentSuggestion {
    pub item_id: ItemId,
    pub warehouse_id: WarehouseId,
    pub on_hand: i64,
    pub safety_stock: i64,
    pub order_quantity: i64,
    pub lead_time_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> ReplenishmentRule {
        ReplenishmentRule {
            item_id: ItemId::new(),
            warehouse_id: WarehouseId::new(),
            safety_stock: 10,
            max_stock: 50,
            min_order_qty: 25,
            lead_time_days: 3,
        }
    }

    #[test]
    fn above_safety_needs_nothing() {
        assert_eq!(rule().evaluate(11), None);
    }

    #[test]
    fn orders_up_to_max() {
        let s = rule().evaluate(10).unwrap();
        assert_eq!(s.order_quantity, 40);
        assert_eq!(s.lead_time_days, 3);
    }

    #[test]
    fn minimum_order_quantity_wins_when_larger() {
        let mut r = rule();
        r.max_stock = 20;
        assert_eq!(r.evaluate(5).unwrap().order_quantity, 25);
    }

    #[test]
    fn inconsistent_levels_are_rejected() {
        let mut r = rule();
        r.max_stock = 5;
        assert!(r.validate().is_err());
        assert!(rule().validate().is_ok());
    }
}
