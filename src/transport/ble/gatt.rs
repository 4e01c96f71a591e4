//! GATT application builder

use bluer::gatt::local::{
    Application, Characteristic, CharacteristicControl, CharacteristicNotify,
    CharacteristicNotifyMethod, CharacteristicRead, Service, characteristic_control,
};
use futures::FutureExt;
use tracing::debug;

use crate::core::types::{ServiceDescriptor, ValueBuffer};

/// Build the single-service GATT application for `descriptor`
///
/// Reads are answered from the descriptor's value buffer. Notifications use
/// the socket based method: each subscription arrives on the returned
/// [`CharacteristicControl`] as a writer for that central.
pub fn build_application(descriptor: &ServiceDescriptor) -> (Application, CharacteristicControl) {
    let (control, control_handle) = characteristic_control();

    let read = descriptor
        .properties
        .read
        .then(|| build_read(descriptor.value.clone()));

    let notify = descriptor.properties.notify.then(|| CharacteristicNotify {
        notify: true,
        method: CharacteristicNotifyMethod::Io,
        ..Default::default()
    });

    let application = Application {
        services: vec![Service {
            uuid: descriptor.service_uuid,
            primary: true,
            characteristics: vec![Characteristic {
                uuid: descriptor.characteristic_uuid,
                read,
                notify,
                control_handle,
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };

    (application, control)
}

fn build_read(value: ValueBuffer) -> CharacteristicRead {
    CharacteristicRead {
        read: true,
        fun: Box::new(move |req| {
            let value = value.clone();
            async move {
                let value = value.snapshot().await;
                debug!(
                    "Read request from {} at offset {} ({} bytes)",
                    req.device_address,
                    req.offset,
                    value.len()
                );
                let offset = usize::from(req.offset).min(value.len());
                Ok(value[offset..].to_vec())
            }
            .boxed()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{core::types::CharacteristicProperties, transport::ble::uuids::*};

    #[test]
    fn test_application_layout() {
        let descriptor =
            ServiceDescriptor::new(DEFAULT_SERVICE_UUID, DEFAULT_CHARACTERISTIC_UUID);
        let (app, _control) = build_application(&descriptor);

        assert_eq!(app.services.len(), 1);
        let service = &app.services[0];
        assert_eq!(service.uuid, DEFAULT_SERVICE_UUID);
        assert!(service.primary);

        assert_eq!(service.characteristics.len(), 1);
        let characteristic = &service.characteristics[0];
        assert_eq!(characteristic.uuid, DEFAULT_CHARACTERISTIC_UUID);
        assert!(characteristic.read.is_some());
        assert!(characteristic.write.is_none());

        let notify = characteristic.notify.as_ref().unwrap();
        assert!(notify.notify);
        assert!(matches!(notify.method, CharacteristicNotifyMethod::Io));
    }

    #[test]
    fn test_notify_only_characteristic() {
        let mut descriptor =
            ServiceDescriptor::new(DEFAULT_SERVICE_UUID, DEFAULT_CHARACTERISTIC_UUID);
        descriptor.properties = CharacteristicProperties {
            read: false,
            notify: true,
        };

        let (app, _control) = build_application(&descriptor);
        let characteristic = &app.services[0].characteristics[0];
        assert!(characteristic.read.is_none());
        assert!(characteristic.notify.is_some());
    }
}
