pub mod config;
pub mod connector;
pub mod logger;
pub mod statistics;

use std::sync::Arc;

use codec::{rtp, sequence};
use service::{FeedbackDispatcher, FeedbackEvent};
use tokio::task::JoinSet;

use self::{
    config::Config,
    connector::{AnySocket, Connector, Error, TransportConnector},
};

/// In order to let the integration test directly use the rtp-transport crate
/// and start the transport, a function is opened to replace the main function.
pub async fn start(config: Arc<Config>) -> anyhow::Result<()> {
    let logger = logger::select(config.strategy.packet_logger.as_deref())?;
    let TransportConnector { rtp, rtcp } =
        TransportConnector::bind(&config, Some(logger.strategy)).await?;

    let dispatcher = FeedbackDispatcher::default();
    dispatcher.add(Arc::new(|event: &FeedbackEvent| {
        log::info!(
            "rtcp feedback: source={}, fmt={}, type={:?}",
            event.source,
            event.fmt,
            event.payload_type
        );

        Ok::<_, anyhow::Error>(())
    }));

    let mut workers = JoinSet::new();
    workers.spawn(receive_rtp(rtp));
    workers.spawn(receive_rtcp(rtcp, dispatcher));

    // Either stream closing ends the session.
    if let Some(res) = workers.join_next().await {
        workers.abort_all();

        return res?;
    }

    Ok(())
}

async fn receive_rtp(connector: Connector<AnySocket>) -> anyhow::Result<()> {
    let mut highest: Option<u16> = None;

    loop {
        let received = match connector.receive().await {
            Ok(it) => it,
            Err(Error::TransportClosed) => break,
            Err(e) => return Err(e.into()),
        };

        if let Some(seq) = rtp::sequence_number(&received.view) {
            match highest {
                Some(last) if !sequence::is_after(seq, last) => {
                    log::debug!(
                        "rtp packet out of order: seq={seq}, highest={last}, addr={}",
                        received.source
                    );
                }
                _ => highest = Some(seq),
            }
        }

        connector.recycle(received);
    }

    log::info!("rtp stream closed: counts={:?}", connector.statistics());

    Ok(())
}

async fn receive_rtcp(
    connector: Connector<AnySocket>,
    dispatcher: FeedbackDispatcher,
) -> anyhow::Result<()> {
    loop {
        let received = match connector.receive().await {
            Ok(it) => it,
            Err(Error::TransportClosed) => break,
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = dispatcher.dispatch(&received.view) {
            log::warn!("rtcp feedback listener failed: addr={}, err={e}", received.source);
        }

        connector.recycle(received);
    }

    log::info!("rtcp stream closed: counts={:?}", connector.statistics());

    Ok(())
}
