use serde::Deserialize;

use crate::{
    auth::handlers::is_valid_phone,
    customers::repo_types::{CustomerPatch, NewCustomer},
};

const NAME_MAX: usize = 50;
const GENDER_MAX: usize = 5;
const TEXT_MAX: usize = 255;

fn bounded(field: &str, value: String, max: usize, required: bool) -> Result<String, String> {
    let value = value.trim().to_string();
    if required && value.is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.chars().count() > max {
        return Err(format!("{field} must be at most {max} characters"));
    }
    Ok(value)
}

fn phone(value: String) -> Result<String, String> {
    let value = value.trim().to_string();
    if is_valid_phone(&value) {
        Ok(value)
    } else {
        Err("phone must be 11 digits".into())
    }
}

/// Body of `POST /customer/create`.
#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub other: String,
}

impl CreateCustomerRequest {
    pub fn validate(self) -> Result<NewCustomer, String> {
        Ok(NewCustomer {
            customer_id: bounded("customer_id", self.customer_id, 64, true)?,
            name: bounded("name", self.name, NAME_MAX, true)?,
            phone: phone(self.phone)?,
            address: bounded("address", self.address, TEXT_MAX, false)?,
            gender: bounded("gender", self.gender, GENDER_MAX, false)?,
            price: bounded("price", self.price, TEXT_MAX, false)?,
            other: bounded("other", self.other, TEXT_MAX, false)?,
        })
    }
}

/// Body of `PUT /admin/customer/update/:customer_id`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub price: Option<String>,
    pub other: Option<String>,
}

impl UpdateCustomerRequest {
    pub fn into_patch(self) -> Result<CustomerPatch, String> {
        Ok(CustomerPatch {
            name: self
                .name
                .map(|v| bounded("name", v, NAME_MAX, true))
                .transpose()?,
            phone: self.phone.map(phone).transpose()?,
            address: self
                .address
                .map(|v| bounded("address", v, TEXT_MAX, false))
                .transpose()?,
            gender: self
                .gender
                .map(|v| bounded("gender", v, GENDER_MAX, false))
                .transpose()?,
            price: self
                .price
                .map(|v| bounded("price", v, TEXT_MAX, false))
                .transpose()?,
            other: self
                .other
                .map(|v| bounded("other", v, TEXT_MAX, false))
                .transpose()?,
        })
    }
}
