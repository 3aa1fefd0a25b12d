use crate::debug::read_callback_data;
use ash::vk;
use ash::vk::DebugUtilsMessageSeverityFlagsEXT;

pub unsafe extern "system" fn vulkan_tracing_callback(
    message_severity: DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let Some(data) = (unsafe { read_callback_data(p_callback_data) }) else {
        return vk::FALSE;
    };
    let (id_name, id_number, message) = (data.id_name, data.id_number, data.message);

    match message_severity {
        DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(?message_type, "[{id_name} ({id_number})]: {message}");
        }
        DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(?message_type, "[{id_name} ({id_number})]: {message}");
        }
        DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(?message_type, "[{id_name} ({id_number})]: {message}");
        }
        DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(?message_type, "[{id_name} ({id_number})]: {message}");
        }
        _ => tracing::debug!(?message_type, "[{id_name} ({id_number})]: {message}"),
    }

    vk::FALSE
}
