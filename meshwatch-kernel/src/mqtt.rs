//! Optional MQTT trigger for chart regeneration: the chart renderer publishes
//! on a topic after writing new charts, each publish becomes one chart event.

use crate::config::MqttConf;
use crate::events::EventHub;
use crate::health::HealthTracker;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

pub fn spawn_chart_trigger_listener(conf: MqttConf, hub: EventHub, health: HealthTracker) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new(format!("meshwatch-kernel-{}", std::process::id()), &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        health.mark_mqtt_connecting();

        info!("listening for chart updates on mqtt://{}:{}/{}", conf.host, conf.port, conf.chart_topic);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    // sessions are clean, so subscribe again on every (re)connect
                    if let Err(e) = client.try_subscribe(&conf.chart_topic, QoS::AtLeastOnce) {
                        warn!("MQTT subscribe to {} failed: {e:?}", conf.chart_topic);
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if is_chart_topic(&conf.chart_topic, &p.topic) => {
                    let delivered = hub.publish_chart_update();
                    debug!("chart update from {} delivered to {delivered} subscribers", p.topic);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT error: {e:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

/// Exact match, or a trailing `#` wildcard in the configured topic.
fn is_chart_topic(configured: &str, topic: &str) -> bool {
    match configured.strip_suffix('#') {
        Some(prefix) => topic.starts_with(prefix),
        None => configured == topic,
    }
}
