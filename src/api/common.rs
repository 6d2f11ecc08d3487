use std::convert::Infallible;

use rocket::{
    http::Status,
    request::{FromParam, FromRequest, Outcome},
    Request,
};

use crate::model::Principal;

/// Header carrying the caller's identity. Authentication happens upstream;
/// whatever arrives here is trusted.
pub const PRINCIPAL_HEADER: &str = "X-Principal";

/// The principal making the request.
/// Fails with a 401 if the request does not say who it is from, or names the
/// null principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Principal);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.headers().get_one(PRINCIPAL_HEADER) {
            Some(principal) => {
                let principal = Principal::new(principal);
                if principal.is_null() {
                    warn!("Refused request from the null principal");
                    Outcome::Error((Status::Unauthorized, ()))
                } else {
                    Outcome::Success(Caller(principal))
                }
            }
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

impl<'a> FromParam<'a> for Principal {
    type Error = Infallible;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Ok(Principal::new(param))
    }
}
