use clap::{Arg, Command};
use fbus::connector::Connector;
use fbus::transport::link::{serial_wire, Link};
use fbus::transport::Transport;
use fbus::upstream::Upstream;
use fbus::Id;
use flint::logging;
use gwcore::config::GatewayConfig;
use gwcore::container::Container;
use gwcore::service::Service;
use gwcore::storage::MemoryStorage;
use std::io::BufRead;
use std::time::Duration;

fn main() {
    let matches = Command::new("gateway")
        .about("FB-Bus IoT edge gateway")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .default_value("gateway.yaml"),
        )
        .get_matches();

    let log = logging::root();

    let config_path = matches.get_one::<String>("config").expect("defaulted");
    let config = GatewayConfig::load(config_path);

    let mut services = Vec::new();
    let mut consumers = Vec::new();

    for descriptor in &config.connectors {
        if descriptor.kind != "fb-bus" {
            logging::warn!(log, "unknown connector type skipped";
                           "context" => "bootstrap",
                           "type" => descriptor.kind.as_str());

            continue;
        }

        let port = serialport::new(
            descriptor.params.serial_interface.as_str(),
            descriptor.params.baud_rate,
        )
        .timeout(Duration::from_millis(1))
        .open();

        let port = match port {
            Ok(port) => port,
            Err(err) => {
                logging::crit!(log, "serial device could not be opened, connector aborted";
                               "context" => "bootstrap",
                               "interface" => descriptor.params.serial_interface.as_str(),
                               "error" => %err);

                continue;
            }
        };

        let link = Link::new(serial_wire(port), descriptor.params.address, &log);
        let transport = Transport::new(link, &log);
        let (upstream, events) = Upstream::channel(&log);

        let container = Container::new(Box::new(MemoryStorage::new()), &log);
        consumers.push(container.spawn(events));

        let connector = Connector::new(Id::generate(), transport, upstream, &log);
        services.push(Service::open(connector, &log));

        logging::info!(log, "connector started";
                       "context" => "bootstrap",
                       "interface" => descriptor.params.serial_interface.as_str(),
                       "baud_rate" => descriptor.params.baud_rate,
                       "address" => descriptor.params.address);
    }

    if services.is_empty() {
        logging::crit!(log, "no connector could be started"; "context" => "bootstrap");

        return;
    }

    logging::info!(log, "gateway is running, press enter to stop";
                   "context" => "bootstrap",
                   "connectors" => services.len());

    let stdin = std::io::stdin();
    let mut line = String::new();
    drop(stdin.lock().read_line(&mut line));

    for service in services {
        service.close();
    }

    for consumer in consumers {
        drop(consumer.join());
    }
}
