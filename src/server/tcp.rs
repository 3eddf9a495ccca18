// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server skeleton

use std::{future::Future, io, net::SocketAddr, num::NonZeroUsize, sync::Arc};

use futures_util::{SinkExt as _, StreamExt as _};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::Semaphore,
};
use tokio_util::codec::Framed;

use crate::{
    codec::tcp::ServerCodec,
    frame::{
        tcp::{RequestFrame, ResponseAdu},
        ExceptionCode, ExceptionResponse, Response, SlaveRequest,
    },
};

use super::{simulator::failure_response, Service, Terminated};

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    max_connections: Option<Arc<Semaphore>>,
}

impl Server {
    /// Attach the Modbus server to a TCP socket server.
    #[must_use]
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            max_connections: None,
        }
    }

    /// Bind a listener with address reuse enabled.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nodelay(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;
        let listener = TcpListener::from_std(socket.into())?;
        Ok(Self::new(listener))
    }

    /// Limit the number of connections served concurrently.
    ///
    /// Further connections are not accepted until a served connection
    /// closes and wait in the listen backlog.
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: NonZeroUsize) -> Self {
        self.max_connections = Some(Arc::new(Semaphore::new(max_connections.get())));
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Listens for incoming connections and starts a Modbus TCP server task
    /// for each connection.
    ///
    /// `OnProcessError` is invoked with the error that terminated a
    /// connection, if any.
    pub async fn serve<S, OnProcessError>(
        &self,
        service: S,
        on_process_error: OnProcessError,
    ) -> io::Result<()>
    where
        S: Service<Request = SlaveRequest, Response = Response, Exception = ExceptionCode>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send,
        OnProcessError: FnOnce(io::Error) + Clone + Send + 'static,
    {
        log::info!("Serving Modbus TCP on {}", self.listener.local_addr()?);
        loop {
            let permit = match &self.max_connections {
                Some(semaphore) => Some(
                    Arc::clone(semaphore)
                        .acquire_owned()
                        .await
                        .map_err(io::Error::other)?,
                ),
                None => None,
            };
            let (stream, socket_addr) = self.listener.accept().await?;
            log::debug!("Accepted connection from {socket_addr}");

            let framed = Framed::new(stream, ServerCodec);
            let service = service.clone();
            let on_process_error = on_process_error.clone();
            tokio::spawn(async move {
                if let Err(err) = process(framed, service).await {
                    log::warn!("Connection from {socket_addr} terminated: {err}");
                    on_process_error(err);
                }
                log::debug!("Connection from {socket_addr} closed");
                drop(permit);
            });
        }
    }

    /// Start an abortable Modbus TCP server task.
    ///
    /// The listener is closed when `abort_signal` resolves. Connections
    /// that have already been accepted are not interrupted.
    pub async fn serve_until<S, X, OnProcessError>(
        self,
        service: S,
        on_process_error: OnProcessError,
        abort_signal: X,
    ) -> io::Result<Terminated>
    where
        S: Service<Request = SlaveRequest, Response = Response, Exception = ExceptionCode>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send,
        X: Future<Output = ()> + Send,
        OnProcessError: FnOnce(io::Error) + Clone + Send + 'static,
    {
        tokio::select! {
            res = self.serve(service, on_process_error) => {
                res.map(|()| Terminated::Finished)
            },
            () = abort_signal => {
                log::trace!("Abort signal received");
                Ok(Terminated::Aborted)
            }
        }
    }
}

/// The request-response loop spawned by [`Server::serve`] for each client.
///
/// Every response is written before the next frame is decoded.
async fn process<S, T>(mut framed: Framed<T, ServerCodec>, service: S) -> io::Result<()>
where
    S: Service<Request = SlaveRequest, Response = Response, Exception = ExceptionCode>,
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(frame) = framed.next().await.transpose()? else {
            log::debug!("TCP socket has been closed");
            break;
        };

        let adu = match frame {
            RequestFrame::Truncated(len) => {
                log::trace!("Dropping truncated frame of {len} byte(s)");
                continue;
            }
            RequestFrame::Malformed {
                hdr,
                function,
                error,
            } => {
                let pdu = failure_response(function);
                if let Err(err) = framed.send(ResponseAdu { hdr, pdu }).await {
                    log::debug!("Failed to send server device failure: {err}");
                }
                return Err(error);
            }
            RequestFrame::Request(adu) => adu,
        };

        let hdr = adu.hdr;
        let function = adu.request.function_code();
        let pdu = match service.call(adu.into()).await {
            Ok(rsp) => rsp.into(),
            Err(exception) => ExceptionResponse {
                function,
                exception,
            }
            .into(),
        };
        framed.send(ResponseAdu { hdr, pdu }).await?;
    }
    Ok(())
}
