use clients::{
    LogisticsClient, MessagingClient, PaymentGateway, QuoteRequest, ShipmentOutcome,
    ShipmentRequest,
};
use model::{OrderSession, PaymentMode, ShippingCharge};
use tracing::{debug, warn};

use crate::{CommerceServiceImpl, ServiceError, pricing};

impl<M, P, L> CommerceServiceImpl<M, P, L>
where
    M: MessagingClient,
    P: PaymentGateway,
    L: LogisticsClient,
{
    /// Quotes shipping for the session's destination and payment class.
    /// A failed or unparseable quote is kept as [`ShippingCharge::Unavailable`].
    pub(crate) async fn quote_shipping(
        &self,
        session: &OrderSession,
        weight_grams: u32,
    ) -> ShippingCharge {
        let request = QuoteRequest {
            origin_pincode: self.settings.origin_pincode.clone(),
            dest_pincode: session.customer.pincode.clone(),
            weight_grams,
            payment_mode: session.payment_mode,
        };

        match self.logistics.quote_shipping_charge(&request).await {
            Ok(charge) => {
                debug!(order_id = %session.order_id, charge, weight_grams, "shipping quoted");
                ShippingCharge::Quoted(charge)
            }
            Err(e) => {
                warn!(
                    order_id = %session.order_id,
                    phone = %session.phone,
                    dest = %request.dest_pincode,
                    error = %e,
                    "shipping quote unavailable"
                );
                ShippingCharge::Unavailable(e.to_string())
            }
        }
    }

    /// # Errors
    /// [`ServiceError::Validation`] when the unit count does not fit the
    /// manifest, [`ServiceError::Adapter`] when the carrier call fails.
    pub(crate) async fn request_shipment(
        &self,
        session: &OrderSession,
        weight_grams: u32,
    ) -> Result<ShipmentOutcome, ServiceError> {
        let quantity = pricing::total_quantity(&session.product_items).ok_or_else(|| {
            ServiceError::Validation(format!("unit count of {} overflows", session.order_id))
        })?;
        let cod_amount = match session.payment_mode {
            PaymentMode::Cod => session.amount,
            PaymentMode::Prepaid => 0,
        };
        let request = ShipmentRequest {
            order_id: session.order_id.clone(),
            phone: session.phone.clone(),
            consignee: session.customer.clone(),
            products_desc: self.catalog.describe(&session.product_items),
            quantity,
            weight_grams,
            payment_mode: session.payment_mode,
            cod_amount,
            total_amount: session.amount,
            pickup_location: self.settings.pickup_location.clone(),
        };

        Ok(self.logistics.create_shipment(&request).await?)
    }
}
