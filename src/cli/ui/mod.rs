mod device_view;
mod module_view;
mod painter;
mod permission_view;
mod table;

pub(crate) use self::device_view::DeviceListView;
pub(crate) use self::module_view::{ClassificationView, ModuleListView};
pub(crate) use self::painter::Painter;
pub(crate) use self::permission_view::PermissionView;
