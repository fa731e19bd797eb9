pub mod fedapay;
pub mod paypal;
pub mod stripe;

pub use fedapay::FedapayProvider;
pub use paypal::PaypalProvider;
pub use stripe::StripeProvider;
