pub mod chatmodels;
pub mod jobmodel;
pub mod offermodel;
pub mod paymentmodel;
