// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{future::Future, ops::Deref};

/// Answers decoded Modbus requests.
///
/// The TCP [`Server`](super::tcp::Server) calls the service once per
/// request and awaits the result before reading the next request of the
/// same connection. An `Err` is sent back as an exception response for
/// the function code of the request.
pub trait Service {
    /// Requests handled by the service.
    type Request;

    /// Normal responses.
    type Response;

    /// Exception codes returned instead of a normal response.
    type Exception;

    /// The future response value.
    type Future: Future<Output = Result<Self::Response, Self::Exception>> + Send;

    /// Process the request and return the response asynchronously.
    fn call(&self, req: Self::Request) -> Self::Future;
}

/// Forwards to the service behind smart pointers like [`std::sync::Arc`].
impl<D> Service for D
where
    D: Deref + ?Sized,
    D::Target: Service,
{
    type Request = <D::Target as Service>::Request;
    type Response = <D::Target as Service>::Response;
    type Exception = <D::Target as Service>::Exception;
    type Future = <D::Target as Service>::Future;

    fn call(&self, req: Self::Request) -> Self::Future {
        self.deref().call(req)
    }
}
