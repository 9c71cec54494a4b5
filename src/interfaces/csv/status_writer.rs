use crate::domain::order::FulfillmentOrder;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct StatusRow<'a> {
    id: &'a str,
    buyer_order_id: &'a str,
    supplier_id: &'a str,
    status: &'a str,
    transaction_ids: String,
    last_error: &'a str,
    updated_at: String,
}

impl<'a> From<&'a FulfillmentOrder> for StatusRow<'a> {
    fn from(order: &'a FulfillmentOrder) -> Self {
        Self {
            id: &order.id,
            buyer_order_id: &order.buyer_order_id,
            supplier_id: &order.supplier_id,
            status: order.status.as_str(),
            transaction_ids: order.transaction_ids.join(";"),
            last_error: order.last_error.as_deref().unwrap_or_default(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

/// Writes fulfillment order status as CSV, one row per order.
pub struct StatusWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> StatusWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, orders: &[FulfillmentOrder]) -> Result<()> {
        if orders.is_empty() {
            self.writer.write_record([
                "id",
                "buyer_order_id",
                "supplier_id",
                "status",
                "transaction_ids",
                "last_error",
                "updated_at",
            ])?;
        }
        for order in orders {
            self.writer.serialize(StatusRow::from(order))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::StatusUpdate;

    #[test]
    fn test_writes_header_and_rows() {
        let mut done = FulfillmentOrder::pending("b1", "storefront");
        done.apply(&StatusUpdate::to(crate::domain::order::OrderStatus::Processing));
        done.apply(&StatusUpdate::failed(
            "transaction rejected: insufficient balance",
            vec!["TRX-1-1".into(), "TRX-1-2".into()],
        ));

        let mut out = Vec::new();
        StatusWriter::new(&mut out).write_orders(&[done.clone()]).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,buyer_order_id,supplier_id,status,transaction_ids,last_error,updated_at")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with(&format!("{},b1,storefront,failed,TRX-1-1;TRX-1-2,", done.id)));
        assert!(row.contains("insufficient balance"));
    }

    #[test]
    fn test_empty_listing_still_has_header() {
        let mut out = Vec::new();
        StatusWriter::new(&mut out).write_orders(&[]).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("id,buyer_order_id"));
    }
}
