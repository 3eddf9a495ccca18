// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{net::SocketAddr, sync::Arc};

use modbus_sim::{
    config::AppConfig,
    registry::SlaveRegistry,
    server::{tcp::Server, SimulatorService},
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
};

/// Slave 1 serves all register kinds and supports time sync, slave 2 does
/// not support time sync.
pub const TOPOLOGY: &str = r#"{
    "slaves": [
        {
            "slaveId": 1,
            "supportsTimeSync": true,
            "maps": [
                {
                    "type": "HoldingRegisters",
                    "ranges": [
                        { "startAddress": 0, "size": 10, "name": "main" },
                        { "startAddress": 10, "size": 10, "name": "aux" },
                        { "startAddress": 100, "size": 4, "name": "clock", "isTimeSync": true }
                    ]
                },
                {
                    "type": "InputRegisters",
                    "ranges": [ { "startAddress": 0, "size": 4, "name": "measurements" } ]
                },
                {
                    "type": "Coils",
                    "ranges": [ { "startAddress": 0, "size": 8, "name": "relays" } ]
                }
            ]
        },
        {
            "slaveId": 2,
            "maps": [
                {
                    "type": "HoldingRegisters",
                    "ranges": [ { "startAddress": 0, "size": 4, "name": "clock", "isTimeSync": true } ]
                }
            ]
        }
    ]
}"#;

pub fn registry() -> Arc<SlaveRegistry> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = AppConfig::from_json_str(TOPOLOGY).unwrap();
    Arc::new(config.build_registry().unwrap())
}

/// Serve `registry` on an ephemeral port in a background task.
pub async fn start_server(registry: Arc<SlaveRegistry>) -> SocketAddr {
    start(Server::new(TcpListener::bind("127.0.0.1:0").await.unwrap()), registry)
}

pub fn start(server: Server, registry: Arc<SlaveRegistry>) -> SocketAddr {
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let on_process_error = |err| {
            eprintln!("{err}");
        };
        server
            .serve(SimulatorService::new(registry), on_process_error)
            .await
    });
    addr
}

/// Send raw request bytes and read one response frame.
pub async fn transact(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream.write_all(request).await.unwrap();
    read_response(stream).await
}

pub async fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut frame = vec![0; 6];
    stream.read_exact(&mut frame).await.unwrap();
    let len = usize::from(u16::from_be_bytes([frame[4], frame[5]]));
    frame.resize(6 + len, 0);
    stream.read_exact(&mut frame[6..]).await.unwrap();
    frame
}
