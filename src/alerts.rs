use tokio::sync::broadcast;

use crate::config::AlertSpec;
use crate::quotes::QuoteCache;

struct Band {
    spec: AlertSpec,
    armed: bool,
}

/// Watches accepted price updates against the bands given on the command
/// line. A band fires once per excursion and re-arms only after the price
/// comes back inside [lower, upper].
pub struct AlertMonitor {
    bands: Vec<Band>,
    cache: QuoteCache,
    pub tx: broadcast::Sender<crate::command::Command>,
    pub rx: broadcast::Receiver<crate::command::Command>,
}

impl AlertMonitor {
    pub fn new(
        specs: Vec<AlertSpec>,
        tx: broadcast::Sender<crate::command::Command>,
        rx: broadcast::Receiver<crate::command::Command>,
    ) -> AlertMonitor {
        AlertMonitor {
            bands: specs
                .into_iter()
                .map(|spec| Band { spec, armed: true })
                .collect(),
            cache: QuoteCache::new(),
            tx,
            rx,
        }
    }

    pub async fn run(&mut self) -> Result<(), anyhow::Error> {
        while let Ok(message) = self.rx.recv().await {
            if !self.handle_message(message) {
                break;
            }
        }
        Ok(())
    }

    /// Returns false once the app is shutting down. Ticks go through the
    /// same cache rules as everywhere else, so a tick ahead of the first
    /// snapshot never fires a band.
    fn handle_message(&mut self, message: crate::command::Command) -> bool {
        match message {
            crate::command::Command::QuoteTick(symbol, price, timestamp) => {
                if self.cache.apply_tick(&symbol, price, timestamp) {
                    self.check_bands(&symbol, price);
                }
            }
            crate::command::Command::QuoteSnapshot(quote) => {
                let symbol = quote.symbol.clone();
                let price = quote.price;
                if self.cache.apply_snapshot(quote) {
                    self.check_bands(&symbol, price);
                }
            }
            crate::command::Command::Exit => {
                return false;
            }
            _ => {}
        }
        true
    }

    fn check_bands(&mut self, symbol: &str, price: f64) {
        for band in self.bands.iter_mut() {
            if band.spec.symbol != symbol {
                continue;
            }
            if band.armed {
                if price < band.spec.lower {
                    let notify_msg = format!(
                        "{} last {:.2} below lower bound {:.2}",
                        symbol, price, band.spec.lower
                    );
                    let _ = self.tx.send(crate::command::Command::Notify(
                        symbol.to_string(),
                        notify_msg,
                    ));
                    band.armed = false;
                } else if price > band.spec.upper {
                    let notify_msg = format!(
                        "{} last {:.2} above upper bound {:.2}",
                        symbol, price, band.spec.upper
                    );
                    let _ = self.tx.send(crate::command::Command::Notify(
                        symbol.to_string(),
                        notify_msg,
                    ));
                    band.armed = false;
                }
            } else if price >= band.spec.lower && price <= band.spec.upper {
                band.armed = true;
            }
        }
    }
}
