// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#[allow(unused)]
mod simulator;

use std::{num::NonZeroUsize, time::Duration};

use modbus_sim::server::tcp::Server;
use tokio::time::timeout;
use tokio_modbus::{client::tcp::connect_slave, prelude::*};

use simulator::{registry, start};

#[tokio::test]
async fn excess_connection_waits_for_a_free_slot() -> anyhow::Result<()> {
    let server = Server::bind("127.0.0.1:0".parse()?)?.with_max_connections(NonZeroUsize::MIN);
    let addr = start(server, registry());

    let mut first = connect_slave(addr, Slave(1)).await?;
    assert_eq!(first.read_holding_registers(0, 1).await??, [0]);

    // Completes the handshake through the listen backlog, but is not served.
    let mut second = connect_slave(addr, Slave(1)).await?;
    let pending = tokio::spawn(async move {
        let words = second.read_holding_registers(0, 1).await;
        (second, words)
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());

    first.disconnect().await?;
    drop(first);

    let (_second, words) = timeout(Duration::from_secs(2), pending).await??;
    assert_eq!(words??, [0]);
    Ok(())
}
