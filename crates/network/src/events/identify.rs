use libp2p::identify::Event;
use owo_colors::OwoColorize;
use tracing::debug;

use super::{EventHandler, EventLoop};

impl EventHandler<Event> for EventLoop {
    async fn handle(&mut self, event: Event) {
        debug!("{}: {:?}", "identify".yellow(), event);

        if let Event::Received { peer_id, info, .. } = event {
            let mut peers = self.peers.write();

            for addr in info.listen_addrs {
                if peers.add_listen_addr(peer_id, addr.clone()) {
                    self.swarm.add_peer_address(peer_id, addr);
                }
            }
        }
    }
}
