//! Route modules for the OCR gateway

pub mod health;
pub mod ocr;
